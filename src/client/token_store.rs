//! Client-side token persistence

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where the client keeps its bearer token between requests.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn clear(&self);
}

/// Process-local store; the token is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: String,
}

/// Store backed by a small JSON file `{"token": "..."}`.
///
/// The file is read once on open; afterwards the cached value is
/// authoritative and every change is written through.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = read_token_file(&path);
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    /// `~/.config/aiqiji-cms/token.json`
    pub fn default_path() -> PathBuf {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aiqiji-cms")
            .join("token.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&TokenFile {
            token: token.to_string(),
        })
        .map_err(io::Error::other)?;
        fs::write(&self.path, body)
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), "Failed to read token file: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<TokenFile>(&raw) {
        Ok(file) if !file.token.is_empty() => Some(file.token),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), "Ignoring malformed token file: {}", e);
            None
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: &str) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        match self.write(token) {
            Ok(()) => debug!(path = %self.path.display(), "Token saved"),
            Err(e) => warn!(path = %self.path.display(), "Failed to save token: {}", e),
        }
    }

    fn clear(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Token removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove token file: {}", e),
        }
    }
}
