//! # Credential Store Module
//!
//! Questo modulo gestisce i segreti necessari per pubblicare sulle due destinazioni.
//!
//! ## Responsabilità:
//! - Definisce il trait `CredentialStore` (get/set di segreti per nome)
//! - Persiste i segreti in `~/.media-crosspost/credentials.json`
//! - Converte le chiavi grezze in credenziali tipizzate per destinazione
//!
//! ## Chiavi:
//! - `twitter_consumer_key`, `twitter_consumer_secret`
//! - `twitter_access_token`, `twitter_access_secret`
//! - `bluesky_identifier`, `bluesky_password`
//!
//! Un valore vuoto è trattato come assente.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub const TWITTER_CONSUMER_KEY: &str = "twitter_consumer_key";
pub const TWITTER_CONSUMER_SECRET: &str = "twitter_consumer_secret";
pub const TWITTER_ACCESS_TOKEN: &str = "twitter_access_token";
pub const TWITTER_ACCESS_SECRET: &str = "twitter_access_secret";
pub const BLUESKY_IDENTIFIER: &str = "bluesky_identifier";
pub const BLUESKY_PASSWORD: &str = "bluesky_password";

pub const ALL_KEYS: &[&str] = &[
    TWITTER_CONSUMER_KEY,
    TWITTER_CONSUMER_SECRET,
    TWITTER_ACCESS_TOKEN,
    TWITTER_ACCESS_SECRET,
    BLUESKY_IDENTIFIER,
    BLUESKY_PASSWORD,
];

/// Key-value store for named string secrets
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>>;
    async fn set(&self, pairs: &[(String, String)]) -> Result<()>;
}

/// Long-lived OAuth 1.0a credential pair for the chunked destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

/// Login pair for the blob destination (handle or email + app password)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueskyCredentials {
    pub identifier: String,
    pub password: String,
}

/// Everything a publish may need; either side can be missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub twitter: Option<TwitterCredentials>,
    pub bluesky: Option<BlueskyCredentials>,
}

impl Credentials {
    pub async fn load(store: &dyn CredentialStore) -> Result<Self> {
        let values = store.get(ALL_KEYS).await?;
        Ok(Self::from_values(&values))
    }

    pub fn from_values(values: &HashMap<String, Option<String>>) -> Self {
        let value = |key: &str| -> Option<String> {
            values
                .get(key)
                .and_then(|v| v.as_ref())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let twitter = match (
            value(TWITTER_CONSUMER_KEY),
            value(TWITTER_CONSUMER_SECRET),
            value(TWITTER_ACCESS_TOKEN),
            value(TWITTER_ACCESS_SECRET),
        ) {
            (Some(consumer_key), Some(consumer_secret), Some(access_token), Some(access_secret)) => {
                Some(TwitterCredentials {
                    consumer_key,
                    consumer_secret,
                    access_token,
                    access_secret,
                })
            }
            _ => None,
        };

        let bluesky = match (value(BLUESKY_IDENTIFIER), value(BLUESKY_PASSWORD)) {
            (Some(identifier), Some(password)) => Some(BlueskyCredentials { identifier, password }),
            _ => None,
        };

        Self { twitter, bluesky }
    }
}

/// JSON file backed store
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Store in the default location under the home directory
    pub async fn open_default() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
            .join(".media-crosspost");
        fs::create_dir_all(&dir).await?;
        Ok(Self::at(dir.join("credentials.json")))
    }

    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>> {
        let _guard = self.lock.lock().await;
        let all = self.read_all().await?;
        Ok(keys
            .iter()
            .map(|key| (key.to_string(), all.get(*key).cloned()))
            .collect())
    }

    async fn set(&self, pairs: &[(String, String)]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        for (key, value) in pairs {
            all.insert(key.clone(), value.clone());
        }
        let content = serde_json::to_string_pretty(&all)?;
        fs::write(&self.path, content).await?;
        restrict_to_owner(&self.path).await?;
        Ok(())
    }
}

/// Secrets file readable and writable by its owner only
#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-memory store for embedding and tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>> {
        let values = self.values.lock().await;
        Ok(keys
            .iter()
            .map(|key| (key.to_string(), values.get(*key).cloned()))
            .collect())
    }

    async fn set(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut values = self.values.lock().await;
        for (key, value) in pairs {
            values.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
