// src/config.rs
//! Runtime configuration: one TOML file with built-in defaults for every key.
//!
//! Resolution order: `$KETOGO_CONFIG_PATH` → `config/curator.toml` → defaults.
//! Env overrides applied on top: `KETOGO_DATA_DIR`, `KETOGO_QUOTA_THRESHOLD`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::admission::{parse_threshold_env, AdmissionConfig, ENV_QUOTA_THRESHOLD};
use crate::rotation::{default_query_pool, ProductFilter};

pub const DEFAULT_CONFIG_PATH: &str = "config/curator.toml";
pub const ENV_CONFIG_PATH: &str = "KETOGO_CONFIG_PATH";
pub const ENV_DATA_DIR: &str = "KETOGO_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub data: DataConfig,
    pub caps: CapsConfig,
    pub objects: ObjectsConfig,
    pub amazon: AmazonConfig,
    pub admission: AdmissionConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub observations_file: String,
    pub objects_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public/data"),
            observations_file: "observations.json".to_string(),
            objects_file: "objects.json".to_string(),
        }
    }
}

impl DataConfig {
    pub fn observations_path(&self) -> PathBuf {
        self.dir.join(&self.observations_file)
    }

    pub fn objects_path(&self) -> PathBuf {
        self.dir.join(&self.objects_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsConfig {
    /// Raw items taken from each feed per run (0 = unlimited).
    pub max_items_per_feed: usize,
    /// New observations per UTC day, counted over persisted `day` tags.
    pub observations_per_day: usize,
    /// New open-policy objects per run.
    pub objects_per_run: usize,
    /// Preview objects per ISO week, counted over persisted `week` tags.
    pub preview_per_week: usize,
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            max_items_per_feed: 50,
            observations_per_day: 12,
            objects_per_run: 4,
            preview_per_week: 3,
        }
    }
}

/// Which policy feeds the objects collection during the daily run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectsMode {
    /// Object policy with quota fallback.
    #[default]
    Open,
    /// Preview-object policy with weekly cap.
    Preview,
    /// Daily run leaves the objects collection alone.
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsConfig {
    pub mode: ObjectsMode,
    /// Disclosure attached to every object entry.
    pub note: Option<String>,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            mode: ObjectsMode::Open,
            note: Some(
                "Objects are selected for their observational value. Affiliate links help sustain this experiment."
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmazonConfig {
    pub marketplace: String,
    pub queries_per_week: usize,
    pub picks_per_run: usize,
    pub item_count: u32,
    pub query_pool: Vec<String>,
    #[serde(flatten)]
    pub filter: ProductFilter,
}

impl Default for AmazonConfig {
    fn default() -> Self {
        Self {
            marketplace: "www.amazon.it".to_string(),
            queries_per_week: 3,
            picks_per_run: 4,
            item_count: 10,
            query_pool: default_query_pool(),
            filter: ProductFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (case-insensitive)
    pub provider: String,
    pub model: Option<String>,
    /// Real calls per UTC day; cache hits are free.
    pub daily_limit: u32,
    pub cache_dir: PathBuf,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: None,
            daily_limit: 20,
            cache_dir: PathBuf::from("cache/ai"),
        }
    }
}

impl CuratorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: CuratorConfig = toml::from_str(s).context("parsing curator config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading curator config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the file, then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`CuratorConfig::load`], but an explicit path wins over the env var.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(p) = explicit {
            Self::load_from_file(p)?
        } else if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(Path::new(DEFAULT_CONFIG_PATH))?
        } else {
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.trim().is_empty() {
                self.data.dir = PathBuf::from(dir.trim());
            }
        }
        if let Some(t) = parse_threshold_env(std::env::var(ENV_QUOTA_THRESHOLD).ok()) {
            self.admission.quota_threshold = t;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.admission.quota_threshold > 100 {
            anyhow::bail!(
                "admission.quota_threshold must be within 0..=100, got {}",
                self.admission.quota_threshold
            );
        }
        let f = &self.amazon.filter;
        if !(f.price_min.is_finite() && f.price_max.is_finite()) || f.price_min > f.price_max {
            anyhow::bail!(
                "amazon price band is invalid: {}..={}",
                f.price_min,
                f.price_max
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = CuratorConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, CuratorConfig::default());
        assert_eq!(cfg.admission.quota_threshold, 20);
        assert_eq!(cfg.caps.preview_per_week, 3);
        assert_eq!(cfg.amazon.filter.price_min, 5.0);
        assert_eq!(cfg.amazon.filter.price_max, 25.0);
        assert_eq!(
            cfg.data.observations_path(),
            PathBuf::from("public/data/observations.json")
        );
    }

    #[test]
    fn partial_sections_override_only_what_they_name() {
        let cfg = CuratorConfig::from_toml_str(
            r#"
            [objects]
            mode = "preview"

            [admission]
            quota_threshold = 10
            allow = ["odd"]

            [amazon]
            price_max = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.objects.mode, ObjectsMode::Preview);
        assert!(cfg.objects.note.is_some());
        assert_eq!(cfg.admission.quota_threshold, 10);
        assert_eq!(cfg.admission.allow, vec!["odd".to_string()]);
        assert!(!cfg.admission.hard_reject.is_empty());
        assert_eq!(cfg.amazon.filter.price_max, 30.0);
        assert_eq!(cfg.amazon.filter.price_min, 5.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(CuratorConfig::from_toml_str("[admission]\nquota_threshold = 101").is_err());
        assert!(CuratorConfig::from_toml_str("[amazon]\nprice_min = 30.0").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply_after_file() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        env::set_var(ENV_DATA_DIR, "/srv/ketogo/data");
        env::set_var(ENV_QUOTA_THRESHOLD, "500");
        let cfg = CuratorConfig::load().unwrap();
        assert_eq!(cfg.data.dir, PathBuf::from("/srv/ketogo/data"));
        assert_eq!(cfg.admission.quota_threshold, 100);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml"));
        assert!(CuratorConfig::load().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_DATA_DIR);
        env::remove_var(ENV_QUOTA_THRESHOLD);
        env::set_current_dir(&old).unwrap();
    }
}
