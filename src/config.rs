//! Layered settings.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_COMPLETION__MODEL`). `OPENAI_API_KEY` fills `completion.api_key`.
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::store::COLLECTIONS_TABLE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub collection: String,
    pub vector_name: String,
    pub images_root: PathBuf,
    pub query_image_root: PathBuf,
    pub results_root: PathBuf,
    pub translator: TranslatorSettings,
    pub completion: CompletionSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorSettings {
    pub max_query_length: usize,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub upload_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("image-retrieval");
        Self {
            db_path: data_dir.join("db"),
            collection: "semantic-image-search".to_string(),
            vector_name: "default".to_string(),
            images_root: PathBuf::from("images"),
            query_image_root: data_dir.join("query_images"),
            results_root: PathBuf::from("search_results"),
            translator: TranslatorSettings {
                max_query_length: 200,
                cache_capacity: 1024,
            },
            completion: CompletionSettings {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                timeout_secs: 20,
                temperature: 0.0,
            },
            server: ServerSettings {
                bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
                upload_limit_bytes: 10 * 1024 * 1024,
            },
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        Self::from_figment(Self::layered(Path::new(""), &env_name))
    }

    /// An empty `config_dir` lets figment search the working directory and its parents.
    fn layered(config_dir: &Path, env_name: &str) -> Figment {
        Self::base()
            .merge(Toml::file(config_dir.join("config.toml")))
            .merge(Toml::file(config_dir.join(format!("config.{}.toml", env_name))))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "completion.api_key".into()))
            .merge(Env::prefixed("APP_").split("__"))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.collection.trim().is_empty() {
            anyhow::bail!("collection must not be empty");
        }
        if self.collection == COLLECTIONS_TABLE {
            anyhow::bail!("collection name '{}' is reserved", COLLECTIONS_TABLE);
        }
        if self.vector_name.trim().is_empty() {
            anyhow::bail!("vector_name must not be empty");
        }
        if self.translator.max_query_length == 0 {
            anyhow::bail!("translator.max_query_length must be positive");
        }
        Ok(())
    }
}
