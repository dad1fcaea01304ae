//! Module registry
//!
//! Host-side mapping from an import path (e.g. `stampede/x/mongo`) to a
//! module factory. The registry is built once at startup and handed to the
//! host; every session asks it for a fresh module instance.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Identity of one concurrently scheduled session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Host-assigned session id, unique within a run
    pub id: u64,
    /// Free-form labels attached by the host (scenario name, ...)
    pub tags: BTreeMap<String, String>,
}

impl SessionInfo {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Values a module instance hands to the script
pub struct Exports {
    /// The default export
    pub default: Box<dyn Any + Send>,
}

impl Exports {
    pub fn new<T: Any + Send>(default: T) -> Self {
        Self {
            default: Box::new(default),
        }
    }

    /// Recover the concrete default export
    pub fn into_default<T: Any>(self) -> Result<T> {
        self.default
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                Error::invalid_argument(format!(
                    "default export is not a {}",
                    std::any::type_name::<T>()
                ))
            })
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exports").finish_non_exhaustive()
    }
}

/// A module created once per process; produces one instance per session
pub trait Module: Send + Sync {
    fn new_instance(&self, session: SessionInfo) -> Box<dyn ModuleInstance>;
}

/// Per-session module instance
pub trait ModuleInstance: Send {
    fn exports(self: Box<Self>) -> Exports;
}

/// Registry of modules by import path
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under an import path
    pub fn register(&mut self, path: impl Into<String>, module: Arc<dyn Module>) -> Result<()> {
        let path = path.into();
        if self.modules.contains_key(&path) {
            return Err(Error::AlreadyRegistered(path));
        }

        info!(module = %path, "Registered module");
        self.modules.insert(path, module);
        Ok(())
    }

    /// Check if a path is registered
    pub fn contains(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    /// Create a fresh instance of a module for one session
    pub fn instantiate(&self, path: &str, session: SessionInfo) -> Result<Exports> {
        let module = self
            .modules
            .get(path)
            .ok_or_else(|| Error::ModuleNotFound(path.to_string()))?;

        debug!(module = %path, session = session.id, "Instantiating module");
        Ok(module.new_instance(session).exports())
    }

    /// List registered import paths
    pub fn paths(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.paths())
            .finish()
    }
}
