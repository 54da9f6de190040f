// src/admission.rs
//! Admission gate: pure keyword policies plus a hash-seeded quota fallback.
//!
//! Layering per policy: link guard → source gate (preview only) → reject
//! vocabularies → allow vocabulary → deterministic quota gate. The quota gate
//! admits a "neutral" item iff `hash_percent(input) < quota_threshold`, so a
//! re-run over the same feed content always reaches the same verdict.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::fingerprint::{anon_id, hash_percent, Namespace};
use crate::ingest::types::RawItem;

pub const DEFAULT_QUOTA_THRESHOLD: u32 = 20;
pub const ENV_QUOTA_THRESHOLD: &str = "KETOGO_QUOTA_THRESHOLD";

/// Why an item was admitted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Approved,
    HardReject,
    LowSignal,
    NoClearFit,
    NoLink,
    SourceNotAllowed,
    /// Product-search hit outside the block-list or price band.
    Filtered,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Approved => "approved",
            Reason::HardReject => "hard_reject",
            Reason::LowSignal => "low_signal",
            Reason::NoClearFit => "no_clear_fit",
            Reason::NoLink => "no_link",
            Reason::SourceNotAllowed => "source_not_allowed",
            Reason::Filtered => "filtered",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub admit: bool,
    pub reason: Reason,
}

impl Verdict {
    fn approved() -> Self {
        Self {
            admit: true,
            reason: Reason::Approved,
        }
    }

    fn reject(reason: Reason) -> Self {
        Self {
            admit: false,
            reason,
        }
    }
}

/// The three policy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// General observations: quota fallback over `title|link`.
    Observation,
    /// Tangible objects: quota fallback over `obj|title|link`.
    Object,
    /// Design-source objects only, no fallback.
    PreviewObject,
}

impl PolicyKind {
    pub fn namespace(self) -> Namespace {
        match self {
            PolicyKind::Observation => Namespace::Observation,
            PolicyKind::Object => Namespace::Object,
            PolicyKind::PreviewObject => Namespace::PreviewObject,
        }
    }

    /// Input of the quota gate. `None` for policies without a fallback.
    pub fn quota_input(self, title: &str, link: &str) -> Option<String> {
        match self {
            PolicyKind::Observation => Some(format!("{title}|{link}")),
            PolicyKind::Object => Some(format!("obj|{title}|{link}")),
            PolicyKind::PreviewObject => None,
        }
    }
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Percentage (0..=100) of neutral items admitted by the quota gate.
    pub quota_threshold: u32,
    pub hard_reject: Vec<String>,
    pub low_signal: Vec<String>,
    pub allow: Vec<String>,
    /// Software/service/finance noise, object policies only.
    pub object_reject: Vec<String>,
    /// Physical-artifact nouns.
    pub object_nouns: Vec<String>,
    /// Generic design/product signals (open object policy only).
    pub object_signals: Vec<String>,
    /// Feeds eligible for the preview-object policy (case-insensitive).
    pub preview_sources: Vec<String>,
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            quota_threshold: DEFAULT_QUOTA_THRESHOLD,
            hard_reject: strings(&[
                "killed", "dead", "death", "shoot", "shooting", "war", "bomb", "attack",
                "terror", "rape", "murder", "suicide", "hostage", "injured", "victim",
                "earthquake", "flood", "fire", "politic", "election", "president", "minister",
                "parliament", "senate", "congress", "opinion", "editorial", "analysis",
                "explainer", "why you should", "how to", "tips", "best", "top ", "deal",
                "discount", "sponsored", "promo", "buy now", "affiliate",
            ]),
            low_signal: strings(&["breaking", "live", "update", "highlights", "recap"]),
            allow: strings(&[
                "odd", "weird", "strange", "bizarre", "absurd", "of course", "apparently",
                "somehow", "unexpected", "mildly", "satisfying", "design", "prototype",
                "invention", "product", "nobody asked", "this exists",
            ]),
            object_reject: strings(&[
                "software", "saas", "app store", "subscription", "startup", "funding",
                "series a", "crypto", "bitcoin", "blockchain", "nft", "stock", "shares",
                "ipo", "earnings", "bank", "loan", "mortgage", "insurance", "fintech",
                "webinar", "podcast", "newsletter", "open source", "github", "platform",
            ]),
            object_nouns: strings(&[
                "lamp", "chair", "stool", "sofa", "table", "desk", "shelf", "cabinet",
                "furniture", "mug", "teapot", "kettle", "bowl", "plate", "cutlery", "spoon",
                "knife", "tableware", "vase", "bottle", "jacket", "sneaker", "shoe",
                "backpack", "wallet", "watch", "eyewear", "wearable", "gadget", "speaker",
                "headphone", "keyboard", "clock", "radio", "camera", "bicycle", "tool",
                "utensil",
            ]),
            object_signals: strings(&[
                "design", "prototype", "invention", "product", "concept", "handmade", "object",
            ]),
            preview_sources: strings(&["Designboom", "Yanko Design", "Dezeen", "Core77"]),
        }
    }
}

/* ----------------------------
Compiled engine
---------------------------- */

/// Lowercased, trimmed term list matched as case-insensitive substrings.
#[derive(Debug, Clone)]
struct Vocabulary(Vec<String>);

impl Vocabulary {
    fn compile(terms: &[String]) -> Self {
        Self(
            terms
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.trim().is_empty())
                .collect(),
        )
    }

    fn hit(&self, lowered: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| lowered.contains(t.as_str()))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Admission {
    quota_threshold: u32,
    hard_reject: Vocabulary,
    low_signal: Vocabulary,
    allow: Vocabulary,
    object_reject: Vocabulary,
    object_nouns: Vocabulary,
    object_signals: Vocabulary,
    preview_sources: Vec<String>,
}

impl Default for Admission {
    fn default() -> Self {
        Self::new(&AdmissionConfig::default())
    }
}

impl Admission {
    pub fn new(cfg: &AdmissionConfig) -> Self {
        Self {
            quota_threshold: cfg.quota_threshold.min(100),
            hard_reject: Vocabulary::compile(&cfg.hard_reject),
            low_signal: Vocabulary::compile(&cfg.low_signal),
            allow: Vocabulary::compile(&cfg.allow),
            object_reject: Vocabulary::compile(&cfg.object_reject),
            object_nouns: Vocabulary::compile(&cfg.object_nouns),
            object_signals: Vocabulary::compile(&cfg.object_signals),
            preview_sources: cfg
                .preview_sources
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn quota_threshold(&self) -> u32 {
        self.quota_threshold
    }

    /// Decide admission of `item` under `kind`. Pure.
    pub fn decide(&self, kind: PolicyKind, item: &RawItem) -> Verdict {
        let verdict = if item.link.trim().is_empty() {
            // Terminal: no entry may exist without a link, whatever the title says.
            Verdict::reject(Reason::NoLink)
        } else {
            let lowered = item.title.to_lowercase();
            match kind {
                PolicyKind::Observation => self.observation(&lowered, item),
                PolicyKind::Object => self.object(&lowered, item),
                PolicyKind::PreviewObject => self.preview_object(&lowered, item),
            }
        };

        debug!(
            target: "admission",
            id = %anon_id(&item.title),
            policy = ?kind,
            admit = verdict.admit,
            reason = %verdict.reason,
        );
        verdict
    }

    fn observation(&self, lowered: &str, item: &RawItem) -> Verdict {
        if self.hard_reject.hit(lowered).is_some() {
            return Verdict::reject(Reason::HardReject);
        }
        if self.low_signal.hit(lowered).is_some() {
            return Verdict::reject(Reason::LowSignal);
        }
        if self.allow.hit(lowered).is_some() {
            return Verdict::approved();
        }
        self.quota_gate(PolicyKind::Observation, item)
    }

    fn object(&self, lowered: &str, item: &RawItem) -> Verdict {
        if self.hard_reject.hit(lowered).is_some() || self.object_reject.hit(lowered).is_some() {
            return Verdict::reject(Reason::HardReject);
        }
        if self.object_nouns.hit(lowered).is_some() || self.object_signals.hit(lowered).is_some() {
            return Verdict::approved();
        }
        self.quota_gate(PolicyKind::Object, item)
    }

    fn preview_object(&self, lowered: &str, item: &RawItem) -> Verdict {
        let source = item.source.trim();
        if !self
            .preview_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(source))
        {
            return Verdict::reject(Reason::SourceNotAllowed);
        }
        if self.hard_reject.hit(lowered).is_some() || self.object_reject.hit(lowered).is_some() {
            return Verdict::reject(Reason::HardReject);
        }
        if self.object_nouns.hit(lowered).is_some() {
            Verdict::approved()
        } else {
            Verdict::reject(Reason::NoClearFit)
        }
    }

    fn quota_gate(&self, kind: PolicyKind, item: &RawItem) -> Verdict {
        match kind.quota_input(&item.title, &item.link) {
            Some(input) if hash_percent(&input) < self.quota_threshold => Verdict::approved(),
            _ => Verdict::reject(Reason::NoClearFit),
        }
    }
}

/// Parse `KETOGO_QUOTA_THRESHOLD`-style overrides, clamped to 0..=100.
pub fn parse_threshold_env(raw: Option<String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .map(|v| v.min(100))
}

/* ----------------------------
Tests
---------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(source: &str, title: &str, link: &str) -> RawItem {
        RawItem {
            source: source.into(),
            title: title.into(),
            link: link.into(),
            published_at: Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap(),
            summary: None,
        }
    }

    #[test]
    fn weird_lamp_is_approved_by_allow_list() {
        let a = Admission::default();
        let v = a.decide(
            PolicyKind::Observation,
            &item("Reddit", "Weird lamp shaped like a cloud", "https://x/1"),
        );
        assert_eq!(v, Verdict::approved());
    }

    #[test]
    fn empty_link_is_no_link_whatever_the_title() {
        let a = Admission::default();
        for title in ["Weird lamp", "War breaks out", "Neutral headline 6", ""] {
            for kind in [
                PolicyKind::Observation,
                PolicyKind::Object,
                PolicyKind::PreviewObject,
            ] {
                let v = a.decide(kind, &item("Designboom", title, "  "));
                assert_eq!(v.reason, Reason::NoLink, "{title} / {kind:?}");
                assert!(!v.admit);
            }
        }
    }

    #[test]
    fn reject_layers_take_precedence_over_allow() {
        let a = Admission::default();
        let hard = a.decide(
            PolicyKind::Observation,
            &item("R", "Weird election poster", "https://x/2"),
        );
        assert_eq!(hard.reason, Reason::HardReject);
        let low = a.decide(
            PolicyKind::Observation,
            &item("R", "LIVE: strange parade", "https://x/3"),
        );
        assert_eq!(low.reason, Reason::LowSignal);
    }

    #[test]
    fn quota_gate_boundary_is_strict() {
        let a = Admission::default();
        // hash_percent("Neutral headline 99|https://n.example/99") == 19
        let pass = item("R", "Neutral headline 99", "https://n.example/99");
        // hash_percent("Neutral headline 9|https://n.example/9") == 20
        let fail = item("R", "Neutral headline 9", "https://n.example/9");
        assert_eq!(hash_percent("Neutral headline 99|https://n.example/99"), 19);
        assert_eq!(hash_percent("Neutral headline 9|https://n.example/9"), 20);
        assert_eq!(a.decide(PolicyKind::Observation, &pass), Verdict::approved());
        assert_eq!(
            a.decide(PolicyKind::Observation, &fail),
            Verdict::reject(Reason::NoClearFit)
        );
    }

    #[test]
    fn threshold_is_configurable() {
        let cfg = AdmissionConfig {
            quota_threshold: 21,
            ..Default::default()
        };
        let a = Admission::new(&cfg);
        let v = a.decide(
            PolicyKind::Observation,
            &item("R", "Neutral headline 9", "https://n.example/9"),
        );
        assert!(v.admit);

        let closed = Admission::new(&AdmissionConfig {
            quota_threshold: 0,
            ..Default::default()
        });
        let v = closed.decide(
            PolicyKind::Observation,
            &item("R", "Neutral headline 6", "https://n.example/6"),
        );
        assert_eq!(v.reason, Reason::NoClearFit);
    }

    #[test]
    fn object_quota_uses_its_own_namespace() {
        let a = Admission::default();
        let it = item("HN", "Neutral headline 0", "https://n.example/0");
        assert!(a.decide(PolicyKind::Observation, &it).admit);
        assert_eq!(
            a.decide(PolicyKind::Object, &it).reason,
            Reason::NoClearFit
        );

        let pass = item("HN", "Neutral headline 136", "https://n.example/136");
        let fail = item("HN", "Neutral headline 292", "https://n.example/292");
        assert!(a.decide(PolicyKind::Object, &pass).admit);
        assert!(!a.decide(PolicyKind::Object, &fail).admit);
    }

    #[test]
    fn object_policy_rejects_software_and_admits_artifacts() {
        let a = Admission::default();
        let saas = a.decide(
            PolicyKind::Object,
            &item("PH", "A new SaaS for chair makers", "https://p/1"),
        );
        assert_eq!(saas.reason, Reason::HardReject);
        let mug = a.decide(
            PolicyKind::Object,
            &item("PH", "Ceramic mug with a built-in shelf", "https://p/2"),
        );
        assert!(mug.admit);
    }

    #[test]
    fn preview_requires_design_source_and_noun() {
        let a = Admission::default();
        let wrong_source = a.decide(
            PolicyKind::PreviewObject,
            &item("Hacker News", "Sculptural lamp", "https://d/1"),
        );
        assert_eq!(wrong_source.reason, Reason::SourceNotAllowed);

        let ok = a.decide(
            PolicyKind::PreviewObject,
            &item("designboom", "Sculptural lamp", "https://d/1"),
        );
        assert!(ok.admit);

        // Signal words alone do not qualify, and there is no quota fallback.
        let signal_only = a.decide(
            PolicyKind::PreviewObject,
            &item("Designboom", "Neutral headline 6 design concept", "https://d/2"),
        );
        assert_eq!(signal_only.reason, Reason::NoClearFit);
    }

    #[test]
    fn threshold_env_is_clamped() {
        assert_eq!(parse_threshold_env(Some(" 35 ".into())), Some(35));
        assert_eq!(parse_threshold_env(Some("250".into())), Some(100));
        assert_eq!(parse_threshold_env(Some("x".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }
}
