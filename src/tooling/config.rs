use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::core::slots::{Attribution, MAX_SLOTS};
use crate::core::token::{Token, TokenIdentity};
use crate::impls::demo::DemoCatalog;
use crate::preselect::Collection;
use crate::selection::FlowOptions;

pub const LOOKUP_URL_ENV: &str = "SLOTFILL_LOOKUP_URL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    Single,
    #[default]
    Stepper,
    Meme,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub id: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Token service root. Without it lookups are served from the configured catalog.
    pub base_url: Option<String>,
    pub cache_ttl: String,
    pub timeout: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_ttl: "5m".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub kind: FlowKind,
    pub min_slots: usize,
    pub max_slots: usize,
    pub user: UserConfig,
    pub lookup: LookupConfig,
    pub default_collection: Option<Collection>,
    pub collections: Vec<Collection>,
    pub favorites: Vec<TokenIdentity>,
    pub tokens: Vec<Token>,
    pub log_level: Option<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            kind: FlowKind::default(),
            min_slots: 1,
            max_slots: 1,
            user: UserConfig::default(),
            lookup: LookupConfig::default(),
            default_collection: None,
            collections: Vec::new(),
            favorites: Vec::new(),
            tokens: Vec::new(),
            log_level: None,
        }
    }
}

impl FlowConfig {
    /// `~/.config/slotfill/flow.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slotfill").join("flow.toml"))
    }

    /// Reads TOML, JSON or YAML by extension, applies env overrides and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file: {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let mut config: FlowConfig = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config: {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML config: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("invalid TOML config: {}", path.display()))?,
        };
        config.apply_env();
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FlowConfig = toml::from_str(content).context("invalid TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(LOOKUP_URL_ENV) {
            if !url.trim().is_empty() {
                self.lookup.base_url = Some(url.trim().to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_slots == 0 || self.max_slots > MAX_SLOTS {
            bail!("max_slots must be between 1 and {MAX_SLOTS}, got {}", self.max_slots);
        }
        if self.min_slots > self.max_slots {
            bail!(
                "min_slots ({}) cannot exceed max_slots ({})",
                self.min_slots,
                self.max_slots
            );
        }
        if self.kind == FlowKind::Single && (self.min_slots, self.max_slots) != (1, 1) {
            bail!("single flows have exactly one required slot");
        }
        self.cache_ttl()?;
        self.timeout()?;
        if let Some(base) = &self.lookup.base_url {
            url::Url::parse(base).map_err(|err| anyhow!("invalid lookup base_url {base}: {err}"))?;
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Result<Duration> {
        humantime::parse_duration(&self.lookup.cache_ttl)
            .with_context(|| format!("invalid cache_ttl {:?}", self.lookup.cache_ttl))
    }

    pub fn timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.lookup.timeout)
            .with_context(|| format!("invalid timeout {:?}", self.lookup.timeout))
    }

    pub fn attribution(&self) -> Attribution {
        Attribution::new(self.user.id.clone(), self.user.username.clone())
    }

    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions::new(self.min_slots, self.max_slots)
            .with_user(self.attribution())
            .with_default_collection(self.default_collection.clone())
    }

    pub fn demo_catalog(&self) -> DemoCatalog {
        let mut collections = self.collections.clone();
        if let Some(default) = &self.default_collection {
            if !collections.contains(default) {
                collections.push(default.clone());
            }
        }
        DemoCatalog {
            tokens: self.tokens.clone(),
            collections,
            favorites: self.favorites.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn toml_config_with_defaults() {
        let config = FlowConfig::from_toml_str(
            r#"
            kind = "meme"
            min_slots = 2
            max_slots = 3

            [user]
            id = "u-1"

            [default_collection]
            chain = "eth"
            address = "0xdef"
            size = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.kind, FlowKind::Meme);
        assert_eq!(config.cache_ttl().unwrap(), Duration::from_secs(300));
        assert_eq!(config.timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.attribution().user_id.as_deref(), Some("u-1"));
        assert_eq!(config.demo_catalog().collections.len(), 1);
    }

    #[test]
    fn rejects_bad_bounds_and_durations() {
        assert!(FlowConfig::from_toml_str("max_slots = 11").is_err());
        assert!(FlowConfig::from_toml_str("min_slots = 3\nmax_slots = 2").is_err());
        assert!(FlowConfig::from_toml_str("kind = \"single\"\nmax_slots = 2").is_err());
        assert!(FlowConfig::from_toml_str("[lookup]\ncache_ttl = \"soon\"").is_err());
    }

    #[test]
    fn loads_yaml_and_json_by_extension() {
        let mut yaml = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(yaml, "max_slots: 4\nfavorites:\n  - chain: eth\n    contractAddress: '0xabc'\n    tokenId: '7'").unwrap();
        let config = FlowConfig::load(yaml.path()).unwrap();
        assert_eq!(config.max_slots, 4);
        assert_eq!(config.favorites[0].token_id, "7");

        let mut json = Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"max_slots": 2, "lookup": {{"timeout": "250ms"}}}}"#).unwrap();
        let config = FlowConfig::load(json.path()).unwrap();
        assert_eq!(config.timeout().unwrap(), Duration::from_millis(250));
    }
}
