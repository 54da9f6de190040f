// src/commentary/mod.rs
//! Micro-commentary ("micro judgment") strategies behind one trait.
//! The pipeline only sees `dyn Commentator`; a `None` never blocks admission.

pub mod ai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AiConfig;
use crate::fingerprint::hash_index;

/// Commentary in the primary language, optionally with a second language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentary {
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
}

#[async_trait]
pub trait Commentator: Send + Sync {
    /// Short annotation for `title` (plus optional context), or `None`.
    async fn comment(&self, title: &str, context: Option<&str>) -> Option<Commentary>;
    fn name(&self) -> &'static str;
}

pub type DynCommentator = Arc<dyn Commentator>;

pub const STOCK_PHRASES: [&str; 6] = [
    "This exists.",
    "Someone approved this.",
    "No one stopped it.",
    "And yet, here we are.",
    "Perfectly normal, apparently.",
    "Reality remains employed.",
];

/// Deterministic pick from a fixed phrase list, keyed by the title hash.
#[derive(Debug, Clone)]
pub struct StockPhrases {
    phrases: Vec<String>,
}

impl Default for StockPhrases {
    fn default() -> Self {
        Self::new(STOCK_PHRASES.iter().map(|s| s.to_string()).collect())
    }
}

impl StockPhrases {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases }
    }

    pub fn pick(&self, title: &str) -> Option<&str> {
        if self.phrases.is_empty() {
            return None;
        }
        let key = if title.is_empty() { "x" } else { title };
        Some(self.phrases[hash_index(key, self.phrases.len())].as_str())
    }
}

#[async_trait]
impl Commentator for StockPhrases {
    async fn comment(&self, title: &str, _context: Option<&str>) -> Option<Commentary> {
        self.pick(title).map(|p| Commentary {
            primary: p.to_string(),
            secondary: None,
        })
    }

    fn name(&self) -> &'static str {
        "stock"
    }
}

/// Always `None`.
pub struct Disabled;

#[async_trait]
impl Commentator for Disabled {
    async fn comment(&self, _title: &str, _context: Option<&str>) -> Option<Commentary> {
        None
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Try `first`; on `None` use `second`.
pub struct Fallback<A, B> {
    pub first: A,
    pub second: B,
}

#[async_trait]
impl<A: Commentator, B: Commentator> Commentator for Fallback<A, B> {
    async fn comment(&self, title: &str, context: Option<&str>) -> Option<Commentary> {
        match self.first.comment(title, context).await {
            Some(c) => Some(c),
            None => self.second.comment(title, context).await,
        }
    }

    fn name(&self) -> &'static str {
        self.first.name()
    }
}

/// Build the commentator for observations according to config and env.
///
/// * `AI_TEST_MODE=mock` → deterministic mock provider behind the cache.
/// * AI disabled → stock phrases.
/// * AI enabled → OpenAI behind cache + daily limit, with stock phrases as fallback.
pub fn build_commentator(cfg: &AiConfig) -> DynCommentator {
    let stock = StockPhrases::default();

    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = ai::MockProvider::default();
        let cached = ai::CachingCommentator::new(mock, cfg.cache_dir.clone(), cfg.daily_limit);
        return Arc::new(Fallback {
            first: cached,
            second: stock,
        });
    }

    if !cfg.enabled {
        return Arc::new(stock);
    }

    match cfg.provider.to_ascii_lowercase().as_str() {
        "openai" => match ai::OpenAiProvider::new(cfg.model.as_deref()) {
            Ok(provider) => {
                let cached =
                    ai::CachingCommentator::new(provider, cfg.cache_dir.clone(), cfg.daily_limit);
                Arc::new(Fallback {
                    first: cached,
                    second: stock,
                })
            }
            Err(e) => {
                tracing::warn!(target: "commentary", error = ?e, "AI client unavailable; using stock phrases");
                Arc::new(stock)
            }
        },
        other => {
            tracing::warn!(target: "commentary", provider = other, "unsupported AI provider; using stock phrases");
            Arc::new(stock)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stock_phrase_is_deterministic() {
        let s = StockPhrases::default();
        let a = s.comment("Weird lamp shaped like a cloud", None).await.unwrap();
        let b = s.comment("Weird lamp shaped like a cloud", None).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.primary, "And yet, here we are.");
        assert_eq!(s.pick(""), Some("This exists."));
    }

    #[tokio::test]
    async fn empty_phrase_list_yields_none() {
        let s = StockPhrases::new(Vec::new());
        assert!(s.comment("anything", None).await.is_none());
    }

    #[tokio::test]
    async fn fallback_uses_second_when_first_is_silent() {
        let f = Fallback {
            first: Disabled,
            second: StockPhrases::default(),
        };
        let c = f.comment("x", None).await.unwrap();
        assert_eq!(c.primary, "This exists.");
    }
}
