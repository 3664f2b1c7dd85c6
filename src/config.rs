//! Runtime configuration loaded from `devmind.toml`.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//!
//! ```toml
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//!
//! [sampling]
//! temperature = 0.4
//!
//! [store]
//! path = "devmind.db"
//! ephemeral = false
//!
//! [extract]
//! allowed_extensions = ["html", "css", "js", "ts", "py"]
//!
//! [preview]
//! script_extensions = ["js", "ts"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DevmindError, Result};
use crate::extract::ExtensionPolicy;
use crate::preview::PreviewConfig;
use crate::project::DEFAULT_STORAGE_KEY;
use crate::providers::{Provider, SamplingConfig};

pub const DEFAULT_CONFIG_PATH: &str = "devmind.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    /// Falls back to the provider's default model.
    pub model: Option<String>,
    /// Override for the provider endpoint, e.g. a local proxy.
    pub base_url: Option<String>,
    pub sampling: SamplingConfig,
    pub store: StoreConfig,
    pub extract: ExtractConfig,
    pub preview: PreviewConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Openai,
            model: None,
            base_url: None,
            sampling: SamplingConfig::default(),
            store: StoreConfig::default(),
            extract: ExtractConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub key: String,
    /// Keep projects in memory only.
    pub ephemeral: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("devmind.db"),
            key: DEFAULT_STORAGE_KEY.to_string(),
            ephemeral: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// `None` accepts every extension.
    pub allowed_extensions: Option<Vec<String>>,
}

impl Config {
    /// Read `path`. A missing file is not an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                tracing::debug!(path = %path.display(), "config loaded");
                Self::from_toml_str(&raw)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            return Err(DevmindError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.sampling.temperature
            )));
        }
        if self.store.key.trim().is_empty() {
            return Err(DevmindError::Config("store.key must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn extension_policy(&self) -> ExtensionPolicy {
        match &self.extract.allowed_extensions {
            Some(list) => ExtensionPolicy::allow_list(list.iter()),
            None => ExtensionPolicy::Any,
        }
    }
}
