//! Ordered, name-keyed set of scanners.

use gitfacts_core::{GitfactsError, ScannersConfig};

use crate::scanner::Scanner;
use crate::scanners;

/// Scanners in registration order. Names are unique.
///
/// Built once at startup and shared by reference with everything that
/// dispatches files, so dispatch order is the registration order.
pub struct Registry {
    scanners: Vec<Box<dyn Scanner>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
        }
    }

    /// Every built-in scanner, in the order of [`scanners::all_scanners`].
    pub fn builtin() -> Result<Self, GitfactsError> {
        let mut registry = Self::new();
        for scanner in scanners::all_scanners() {
            registry.register(scanner)?;
        }
        Ok(registry)
    }

    /// Built-ins minus the scanners disabled in `config`.
    pub fn from_config(config: &ScannersConfig) -> Result<Self, GitfactsError> {
        Self::builtin()?.without(&config.disabled)
    }

    /// Add a scanner. A second scanner under an existing name is an error.
    pub fn register(&mut self, scanner: Box<dyn Scanner>) -> Result<(), GitfactsError> {
        if self.get(scanner.name()).is_some() {
            return Err(GitfactsError::Registry(format!(
                "scanner {:?} is already registered",
                scanner.name()
            )));
        }
        tracing::debug!("registered scanner {}", scanner.name());
        self.scanners.push(scanner);
        Ok(())
    }

    /// Drop the named scanners. Naming a scanner that isn't registered is an error.
    pub fn without(mut self, names: &[String]) -> Result<Self, GitfactsError> {
        for name in names {
            let before = self.scanners.len();
            self.scanners.retain(|s| s.name() != name.as_str());
            if self.scanners.len() == before {
                return Err(GitfactsError::Config(format!("unknown scanner {name:?}")));
            }
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Scanner> {
        self.scanners
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Scanner> {
        self.scanners.iter().map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.scanners.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
