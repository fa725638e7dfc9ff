//! Small key/value cookie stores used to remember UI preferences.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::CookieError;

/// Persistent name/value storage.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns `CookieError` if the value cannot be persisted.
    fn set(&self, name: &str, value: &str) -> Result<(), CookieError>;

    /// # Errors
    ///
    /// Returns `CookieError` if the removal cannot be persisted.
    fn remove(&self, name: &str) -> Result<(), CookieError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<(), CookieError> {
        self.lock().insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), CookieError> {
        self.lock().remove(name);
        Ok(())
    }
}

/// Cookie jar persisted as a JSON object on disk.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileCookieJar {
    /// Open the jar at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `CookieError` if an existing file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CookieError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), CookieError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl CookieJar for FileCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<(), CookieError> {
        let mut values = self.lock();
        values.insert(name.to_owned(), value.to_owned());
        self.persist(&values)
    }

    fn remove(&self, name: &str) -> Result<(), CookieError> {
        let mut values = self.lock();
        if values.remove(name).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
