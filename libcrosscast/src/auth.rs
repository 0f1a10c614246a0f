//! Access-token resolution
//!
//! The posting client only needs a bearer token per platform; how tokens
//! are obtained and refreshed is behind the [`AuthManager`] contract.
//! [`TokenStore`] is the built-in implementation: an in-memory map, loadable
//! from per-platform token files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::types::Platform;

/// Source of platform access tokens
#[async_trait]
pub trait AuthManager: Send + Sync {
    /// The bearer token for `platform`, or `None` when not authenticated
    async fn get_access_token(&self, platform: Platform) -> Result<Option<String>>;

    /// Whether a token is currently available for `platform`
    async fn is_authenticated(&self, platform: Platform) -> bool {
        matches!(self.get_access_token(platform).await, Ok(Some(_)))
    }
}

/// In-memory token map with optional file loading
///
/// `from_dir` reads `<platform>.token` files (one token per file, trailing
/// whitespace stripped); platforms without a file are simply not
/// authenticated.
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<Platform, String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tokens from `<platform>.token` files under `dir`
    ///
    /// A missing directory or missing files leave those platforms
    /// unauthenticated rather than failing.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut tokens = HashMap::new();

        for platform in Platform::ALL {
            let path = dir.join(format!("{}.token", platform));
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let token = content.trim().to_string();
                    if !token.is_empty() {
                        debug!(platform = %platform, path = %path.display(), "loaded token");
                        tokens.insert(platform, token);
                    }
                }
                Err(_) => continue,
            }
        }

        Self {
            tokens: RwLock::new(tokens),
        }
    }

    /// Set or replace the token for a platform
    pub async fn insert(&self, platform: Platform, token: impl Into<String>) {
        self.tokens.write().await.insert(platform, token.into());
    }

    /// Drop the token for a platform
    pub async fn remove(&self, platform: Platform) {
        self.tokens.write().await.remove(&platform);
    }
}

#[async_trait]
impl AuthManager for TokenStore {
    async fn get_access_token(&self, platform: Platform) -> Result<Option<String>> {
        Ok(self.tokens.read().await.get(&platform).cloned())
    }
}
