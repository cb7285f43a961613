use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/doi2bib/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub dedupe: DedupeConfig,
    pub clean: CleanConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub doi_requests_per_second: u32,
    pub openalex_requests_per_second: u32,
    pub max_retries: u32,
    pub cache_ttl_days: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    /// Titles must score strictly above this before the oracle is asked.
    pub title_similarity_threshold: f64,
    /// Number of lowercase journal characters used for oracle bucketing.
    pub journal_prefix_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// JabRef-style CSV of `full name,abbreviation` rows.
    pub database_url: String,
    /// Fields dropped from every cleaned entry.
    pub remove_fields: Vec<String>,
    /// Fuzzy journal matches scoring above this are applied without asking.
    pub auto_accept_score: f64,
    /// Abbreviations typed in during earlier runs, by full journal name.
    pub custom: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_model: String,
    pub oracle_calls_per_second: u32,
    pub models: BTreeMap<String, ModelConfig>,
}

/// One named reasoning-service model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub url: String,
    pub model_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    60
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            doi_requests_per_second: 5,
            openalex_requests_per_second: 3,
            max_retries: 3,
            cache_ttl_days: 7,
            polite_email: None,
        }
    }
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.8,
            journal_prefix_len: 5,
        }
    }
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            database_url: "https://raw.githubusercontent.com/JabRef/abbrv.jabref.org/master/journals/journal_abbreviations_acs.csv".to_string(),
            remove_fields: ["abstract", "annote", "file", "keywords", "url", "urldate"]
                .map(String::from)
                .to_vec(),
            auto_accept_score: 0.95,
            custom: BTreeMap::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "ollama_default".to_string(),
            ModelConfig {
                provider: "ollama".to_string(),
                url: "http://localhost:11434/api/generate".to_string(),
                model_name: "llama3".to_string(),
                timeout_secs: default_timeout_secs(),
                api_key_env: None,
                temperature: None,
                max_tokens: None,
            },
        );
        Self {
            default_model: "ollama_default".to_string(),
            oracle_calls_per_second: 1,
            models,
        }
    }
}

// ─── Model registry ────────────────────────────────────────

impl LlmConfig {
    /// Resolve a model by name, or the default model when `name` is `None`.
    pub fn model(&self, name: Option<&str>) -> Result<(&str, &ModelConfig)> {
        let name = name.unwrap_or(&self.default_model);
        if name.is_empty() {
            return Err(CoreError::ConfigError(
                "no default model specified".to_string(),
            ));
        }
        self.models
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| CoreError::ConfigError(format!("model '{name}' not found in config")))
    }

    pub fn add_model(&mut self, name: &str, model: ModelConfig) {
        self.models.insert(name.to_string(), model);
    }

    /// Remove a model. The default model cannot be removed.
    pub fn remove_model(&mut self, name: &str) -> Result<ModelConfig> {
        if name == self.default_model {
            return Err(CoreError::ConfigError(format!(
                "cannot remove the default model '{name}'; set a new default first"
            )));
        }
        self.models
            .remove(name)
            .ok_or_else(|| CoreError::ConfigError(format!("model '{name}' not found in config")))
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.models.contains_key(name) {
            return Err(CoreError::ConfigError(format!(
                "model '{name}' not found in config"
            )));
        }
        self.default_model = name.to_string();
        Ok(())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/doi2bib/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("DOI2BIB_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("doi2bib")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Directory for cached HTTP responses.
    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("doi2bib")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.fetch.doi_requests_per_second, 5);
        assert_eq!(cfg.dedupe.journal_prefix_len, 5);
        assert!(cfg.clean.remove_fields.iter().any(|f| f == "abstract"));
        assert!(cfg.clean.custom.is_empty());
        let (name, model) = cfg.llm.model(None).unwrap();
        assert_eq!(name, "ollama_default");
        assert_eq!(model.provider, "ollama");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.llm.add_model(
            "groq_fast",
            ModelConfig {
                provider: "groq".to_string(),
                url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                model_name: "llama3-8b-8192".to_string(),
                timeout_secs: 30,
                api_key_env: Some("GROQ_API_KEY".to_string()),
                temperature: Some(0.0),
                max_tokens: None,
            },
        );
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.llm.models.len(), 2);
        assert_eq!(loaded.llm.models["groq_fast"].timeout_secs, 30);
        assert_eq!(loaded.fetch.max_retries, cfg.fetch.max_retries);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_doi2bib_config.toml")).unwrap();
        assert_eq!(cfg.llm.default_model, "ollama_default");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dedupe]\ntitle_similarity_threshold = 0.9\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.dedupe.title_similarity_threshold, 0.9);
        assert_eq!(cfg.dedupe.journal_prefix_len, 5);
        assert!(cfg.clean.remove_fields.iter().any(|f| f == "abstract"));
        assert!(cfg.clean.custom.is_empty());
        assert_eq!(cfg.fetch.openalex_requests_per_second, 3);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm\ndefault_model = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(CoreError::TomlParse(_))
        ));
    }

    #[test]
    fn test_model_registry_rules() {
        let mut llm = LlmConfig::default();
        assert!(llm.remove_model("ollama_default").is_err());
        assert!(llm.set_default("missing").is_err());
        assert!(llm.model(Some("missing")).is_err());

        let copy = llm.models["ollama_default"].clone();
        llm.add_model("other", copy);
        llm.set_default("other").unwrap();
        assert!(llm.remove_model("ollama_default").is_ok());
        assert_eq!(llm.model(None).unwrap().0, "other");
    }
}
