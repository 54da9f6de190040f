// src/commentary/ai.rs
//! AI-backed commentary: provider abstraction + file cache + daily call limit.
//! Every failure path collapses to `None`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Commentary, Commentator};
use crate::fingerprint::sha256_hex;

pub const SYSTEM_INSTRUCTION: &str = "You are the quiet editor of an observational website. \
Given a headline, write one brief, dry, ironic nod (at most 6 words). \
Never describe, summarize or explain the item. No emojis, no hashtags, no exclamation marks. \
Reply with JSON only: {\"en\": \"<English>\", \"it\": \"<Italian>\"}.";

const MAX_CHARS: usize = 120;

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does the real remote call, no caching.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn fetch(&self, input: &str) -> Option<Commentary>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API). Requires `OPENAI_API_KEY`.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// `model_override`: defaults to gpt-4o-mini.
    pub fn new(model_override: Option<&str>) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::rss::USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn fetch(&self, input: &str) -> Option<Commentary> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                Msg {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.7,
            max_tokens: 80,
        };

        let resp = match self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "commentary", error = %e, "AI request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(target: "commentary", status = %resp.status(), "AI non-2xx");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        let content = body.choices.first().map(|c| c.message.content.as_str())?;
        parse_reply(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Fixed reply, for tests and `AI_TEST_MODE=mock`.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: Commentary,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fixed: Commentary {
                primary: "Noted (mock).".to_string(),
                secondary: Some("Annotato (mock).".to_string()),
            },
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn fetch(&self, _input: &str) -> Option<Commentary> {
        Some(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// User message: the title, plus a short description when one is given.
pub fn build_input(title: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(ctx) => {
            let ctx: String = ctx.chars().take(280).collect();
            format!("Headline: {title}\nContext: {ctx}")
        }
        None => format!("Headline: {title}"),
    }
}

/// Parse `{"en": "...", "it": "..."}`, tolerating a fenced code block.
/// `None` when the English text is missing or empty after sanitizing.
pub fn parse_reply(content: &str) -> Option<Commentary> {
    #[derive(Deserialize)]
    struct Reply {
        en: Option<String>,
        it: Option<String>,
    }

    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let reply: Reply = serde_json::from_str(trimmed).ok()?;

    let primary = sanitize(reply.en.as_deref().unwrap_or_default());
    if primary.is_empty() {
        return None;
    }
    let secondary = reply
        .it
        .as_deref()
        .map(sanitize)
        .filter(|s| !s.is_empty());
    Some(Commentary { primary, secondary })
}

/// Single line, no control chars, at most 120 chars, whitespace collapsed.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(MAX_CHARS);
    let mut prev_space = false;
    let mut count = 0usize;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() {
            ' '
        } else {
            ch
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            count += 1;
            prev_space = false;
        }
        if count >= MAX_CHARS {
            break;
        }
    }
    out.trim().trim_matches('"').trim().to_string()
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingCommentator<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingCommentator<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made today (cache hits excluded).
    pub fn calls_today(&self) -> u32 {
        self.counter.lock().map(|g| g.count).unwrap_or(0)
    }

    fn limit_reached(&self) -> bool {
        let Ok(mut g) = self.counter.lock() else {
            return true;
        };
        if g.is_expired() {
            g.reset_to_today();
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        g.count >= self.daily_limit_max
    }

    fn record_call(&self) {
        if let Ok(mut g) = self.counter.lock() {
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
    }
}

#[async_trait]
impl<P: Provider> Commentator for CachingCommentator<P> {
    async fn comment(&self, title: &str, context: Option<&str>) -> Option<Commentary> {
        let input = build_input(title, context);
        let key = sha256_hex(&input);

        // Cache hits are free and do not count against the limit.
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Some(hit);
        }
        if self.limit_reached() {
            tracing::debug!(target: "commentary", "daily AI limit reached");
            return None;
        }

        let fresh = self.inner.fetch(&input).await?;
        self.record_call();
        let _ = write_cache_file(&self.cache_dir, &key, &fresh);
        Some(fresh)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Commentary> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &Commentary) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    fs::write(&tmp, json)?;
    fs::rename(tmp, path)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }

    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    fs::write(&tmp, s)?;
    fs::rename(tmp, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn reply_parsing_tolerates_fences_and_rejects_garbage() {
        let c = parse_reply("```json\n{\"en\": \"Of course.\", \"it\": \"Ovviamente.\"}\n```").unwrap();
        assert_eq!(c.primary, "Of course.");
        assert_eq!(c.secondary.as_deref(), Some("Ovviamente."));

        let only_en = parse_reply(r#"{"en": "Fine."}"#).unwrap();
        assert!(only_en.secondary.is_none());

        assert!(parse_reply("Sure! Here is a joke").is_none());
        assert!(parse_reply(r#"{"en": "   ", "it": "Ciao"}"#).is_none());
    }

    #[test]
    fn sanitize_collapses_and_caps() {
        assert_eq!(sanitize("  \"A\n\tnod\"  "), "A nod");
        let long = "é".repeat(300);
        assert_eq!(sanitize(&long).chars().count(), MAX_CHARS);
    }

    #[test]
    fn input_includes_trimmed_context() {
        assert_eq!(build_input("T", None), "Headline: T");
        assert_eq!(build_input("T", Some("  ")), "Headline: T");
        assert_eq!(build_input("T", Some("desc")), "Headline: T\nContext: desc");
    }

    struct Counting(AtomicU32);

    #[async_trait]
    impl Provider for Counting {
        async fn fetch(&self, input: &str) -> Option<Commentary> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(Commentary {
                primary: format!("seen {}", input.len()),
                secondary: None,
            })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct Failing;

    #[async_trait]
    impl Provider for Failing {
        async fn fetch(&self, _input: &str) -> Option<Commentary> {
            None
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn cache_hits_skip_the_provider_and_limit_applies() {
        let dir = tempfile::tempdir().unwrap();
        let c = CachingCommentator::new(Counting(AtomicU32::new(0)), dir.path().to_path_buf(), 1);

        let a = c.comment("one", None).await.unwrap();
        let again = c.comment("one", None).await.unwrap();
        assert_eq!(a, again);
        assert_eq!(c.inner.0.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls_today(), 1);

        // limit of 1 reached: a new title gets nothing
        assert!(c.comment("two", None).await.is_none());
        assert_eq!(c.inner.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_none_and_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let c = CachingCommentator::new(Failing, dir.path().to_path_buf(), 5);
        assert!(c.comment("x", None).await.is_none());
        assert_eq!(c.calls_today(), 0);
    }
}
