use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub labels: LabelConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub user: UserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the object store. Keys are resolved relative to it.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Prefix used when rendering image URLs (e.g. a CDN or bucket URL).
    /// Falls back to `file://` URLs under `root` when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_storage_root() -> PathBuf {
    Config::data_dir().join("objects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    LmStudio,
    OpenAI,
    Ollama,
    /// Collaborator disabled; operations that need it fail with `Unavailable`.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default)]
    pub provider: ProviderType,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on labels requested from the detector.
    #[serde(default = "default_max_labels")]
    pub max_labels: usize,

    /// Number of labels kept as suggested tags, by descending confidence.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Labels below this confidence (0-100) are dropped.
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_vision_model() -> String {
    "gemma-3-4b".to_string()
}

fn default_max_labels() -> usize {
    10
}

fn default_top_n() -> usize {
    5
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            endpoint: default_llm_endpoint(),
            model: default_vision_model(),
            api_key: None,
            max_labels: default_max_labels(),
            top_n: default_top_n(),
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderType,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            endpoint: default_llm_endpoint(),
            model: default_embedding_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// CSV file whose first column lists the candidate labels.
    #[serde(default = "default_vocabulary_path")]
    pub path: PathBuf,
}

fn default_vocabulary_path() -> PathBuf {
    Config::config_dir().join("labels.csv")
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            path: default_vocabulary_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// How many of the best-scoring vocabulary labels are considered per prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    crate::ranking::DEFAULT_TOP_K
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Username used when `--user` is not passed on the command line.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_db_path() -> PathBuf {
    Config::data_dir().join("tagfolio.db")
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            labels: LabelConfig::default(),
            embeddings: EmbeddingConfig::default(),
            vocabulary: VocabularyConfig::default(),
            ranking: RankingConfig::default(),
            user: UserConfig::default(),
        }
    }
}

impl Config {
    /// Load from `TAGFOLIO_CONFIG` if set, otherwise the default location.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("TAGFOLIO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Self::load_from(&config_path)
    }

    /// Load from an explicit path, writing defaults there if it does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagfolio")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagfolio")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
