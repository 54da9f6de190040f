// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "KETOGO_FEEDS_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FeedSpec {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Feeds used when no feed file is configured.
pub fn default_feeds() -> Vec<FeedSpec> {
    vec![
        FeedSpec::new(
            "Reddit · mildlyinteresting",
            "https://www.reddit.com/r/mildlyinteresting/.rss",
        ),
        FeedSpec::new(
            "Reddit · oddlysatisfying",
            "https://www.reddit.com/r/oddlysatisfying/.rss",
        ),
        FeedSpec::new(
            "Reddit · ofcoursethatsathing",
            "https://www.reddit.com/r/ofcoursethatsathing/.rss",
        ),
        FeedSpec::new("Product Hunt", "https://www.producthunt.com/feed"),
        FeedSpec::new("Hacker News · frontpage", "https://hnrss.org/frontpage"),
        FeedSpec::new("ANSA", "https://www.ansa.it/sito/ansait_rss.xml"),
        FeedSpec::new("Designboom", "https://www.designboom.com/feed/"),
        FeedSpec::new("Yanko Design", "https://www.yankodesign.com/feed/"),
    ]
}

/// Load feeds from an explicit path. Supports TOML (`[[feeds]]`) or a JSON array.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load feeds using env var + fallbacks:
/// 1) $KETOGO_FEEDS_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
/// 4) built-in defaults
pub fn load_feeds_default() -> Result<Vec<FeedSpec>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(default_feeds())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feeds format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedSpec>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

fn parse_json(s: &str) -> Result<Vec<FeedSpec>> {
    let v: Vec<FeedSpec> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop blanks, drop repeated URLs (first one wins, order kept).
fn clean_list(items: Vec<FeedSpec>) -> Vec<FeedSpec> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let name = it.name.trim();
        let url = it.url.trim();
        if name.is_empty() || url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        out.push(FeedSpec::new(name, url));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn trim_dedup_and_formats_work() {
        let toml = r#"
            [[feeds]]
            name = " Designboom "
            url = "https://www.designboom.com/feed/"
            [[feeds]]
            name = "dup"
            url = "https://www.designboom.com/feed/"
            [[feeds]]
            name = ""
            url = "https://x"
        "#;
        let json = r#"[{"name": "A", "url": " https://a "}]"#;
        let toml_out = parse_feeds(toml, "toml").unwrap();
        assert_eq!(
            toml_out,
            vec![FeedSpec::new("Designboom", "https://www.designboom.com/feed/")]
        );
        let json_out = parse_feeds(json, "json").unwrap();
        assert_eq!(json_out, vec![FeedSpec::new("A", "https://a")]);
        assert!(parse_feeds("nonsense", "").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);

        // No files → built-in list
        let v = load_feeds_default().unwrap();
        assert_eq!(v, default_feeds());

        // Env wins
        let p_json = tmp.path().join("feeds.json");
        fs::write(&p_json, r#"[{"name":"X","url":"https://x/feed"}]"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v2 = load_feeds_default().unwrap();
        assert_eq!(v2, vec![FeedSpec::new("X", "https://x/feed")]);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load_feeds_default().is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
