//! Domain registry: the set of domains available to the pipeline.
//!
//! The registry publishes immutable [`RegistrySnapshot`]s. Readers take an
//! `Arc` to the current snapshot and keep using it for the whole request;
//! writers validate off-lock, then swap in a new snapshot. A failed
//! registration or reload never changes what readers see.
//!
//! Reads are not lock-free. [`DomainRegistry::snapshot`] takes a read lock
//! only long enough to clone the `Arc`, and writers hold the write lock only
//! for the pointer swap, so a reader waits at most for one swap. Requests
//! never hold the lock while classifying or evaluating.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DomainError, ForgeResult, SchemaError};

use super::Domain;
use super::schema::{self, DomainDef};

/// An immutable view of every registered domain.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    domains: BTreeMap<String, Arc<Domain>>,
    generation: u64,
}

impl RegistrySnapshot {
    /// Look up a domain by exact name.
    pub fn lookup(&self, name: &str) -> ForgeResult<Arc<Domain>> {
        self.get(name).cloned().ok_or_else(|| {
            DomainError::UnknownDomain {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Domain>> {
        self.domains.get(name)
    }

    /// Domains ordered by name.
    pub fn domains(&self) -> impl Iterator<Item = &Arc<Domain>> {
        self.domains.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Incremented on every successful change.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Copy-on-write registry of validated domains.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl DomainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the definitions bundled into the binary.
    pub fn bundled() -> ForgeResult<Self> {
        let registry = Self::new();
        let defs = schema::bundled_definitions()?;
        registry.upsert_all("bundled", &defs)?;
        Ok(registry)
    }

    /// The current snapshot. Cheap; hold it for the duration of a request.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Look up a domain in the current snapshot.
    pub fn lookup(&self, name: &str) -> ForgeResult<Arc<Domain>> {
        self.snapshot().lookup(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().names()
    }

    /// Register a new domain. Fails if the name is taken or the definition
    /// does not validate.
    pub fn register(&self, name: &str, def: &DomainDef) -> ForgeResult<()> {
        let domain = validate_one(name, def)?;
        self.swap(|domains| {
            if domains.contains_key(name) {
                return Err(DomainError::AlreadyRegistered {
                    name: name.to_string(),
                }
                .into());
            }
            domains.insert(name.to_string(), Arc::new(domain));
            Ok(())
        })?;
        tracing::info!(domain = name, "registered domain");
        Ok(())
    }

    /// Replace an existing domain. On any failure the previous definition
    /// stays active.
    pub fn reload(&self, name: &str, def: &DomainDef) -> ForgeResult<()> {
        let domain = match validate_one(name, def) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(domain = name, "reload rejected, keeping previous definition: {e}");
                return Err(e.into());
            }
        };
        self.swap(|domains| match domains.get_mut(name) {
            Some(slot) => {
                *slot = Arc::new(domain);
                Ok(())
            }
            None => Err(DomainError::UnknownDomain {
                name: name.to_string(),
            }
            .into()),
        })?;
        tracing::info!(domain = name, "reloaded domain");
        Ok(())
    }

    /// Parse definitions and register or replace every domain they declare,
    /// all or nothing. Returns the loaded names.
    pub fn load_str(&self, source_name: &str, toml_str: &str) -> ForgeResult<Vec<String>> {
        let defs = schema::parse_definitions(source_name, toml_str)?;
        self.upsert_all(source_name, &defs)
    }

    /// Load a definition file, all or nothing.
    pub fn load_file(&self, path: &Path) -> ForgeResult<Vec<String>> {
        let defs = schema::read_definitions(path)?;
        self.upsert_all(&path.display().to_string(), &defs)
    }

    /// Load every `*.toml` file in `dir`. Files that fail to read or
    /// validate are skipped with a warning. Returns the loaded names.
    pub fn load_dir(&self, dir: &Path) -> Vec<String> {
        let mut loaded = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::debug!(dir = %dir.display(), "no domain directory");
            return loaded;
        };
        let mut files: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for path in files {
            match self.load_file(&path) {
                Ok(mut names) => loaded.append(&mut names),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to load domain definitions: {e}");
                }
            }
        }
        loaded
    }

    fn upsert_all(
        &self,
        source_name: &str,
        defs: &schema::DomainSet,
    ) -> ForgeResult<Vec<String>> {
        let validated = schema::validate_set(source_name, defs)?;
        let names: Vec<String> = validated.iter().map(|d| d.name().to_string()).collect();
        self.swap(|domains| {
            for domain in validated {
                domains.insert(domain.name().to_string(), Arc::new(domain));
            }
            Ok(())
        })?;
        tracing::info!(source = source_name, domains = ?names, "loaded domain definitions");
        Ok(names)
    }

    /// Apply `edit` to a copy of the current domain map and publish the
    /// result. Nothing is published if `edit` fails.
    fn swap(
        &self,
        edit: impl FnOnce(&mut BTreeMap<String, Arc<Domain>>) -> ForgeResult<()>,
    ) -> ForgeResult<()> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut domains = guard.domains.clone();
        edit(&mut domains)?;
        let generation = guard.generation + 1;
        *guard = Arc::new(RegistrySnapshot {
            domains,
            generation,
        });
        Ok(())
    }
}

fn validate_one(name: &str, def: &DomainDef) -> Result<Domain, SchemaError> {
    def.validate(name).map_err(|problems| SchemaError {
        source_name: name.to_string(),
        problems,
    })
}
