//! Tenant registry: one open engine per tenant name.
//!
//! Owned by the server and injected where needed. Each tenant gets a slot in
//! the map; the map lock is only held to find or insert a slot, and the file
//! is opened under the slot's own lock. A tenant's file is therefore opened
//! once even when many callers race on first access, and a slow open never
//! stalls other tenants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::Payload;

/// File extension of tenant databases.
pub const DB_EXTENSION: &str = "db";

/// A tenant's engine, empty until its file has been opened.
type Slot<P> = Arc<Mutex<Option<Arc<Engine<P>>>>>;

/// Lazily populated tenant → engine map rooted at one data directory.
pub struct Registry<P = Payload> {
    root: PathBuf,
    engines: RwLock<HashMap<String, Slot<P>>>,
}

impl<P> Registry<P>
where
    P: Serialize + DeserializeOwned,
{
    /// Create a registry over `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            engines: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the database file backing `tenant`.
    pub fn tenant_path(&self, tenant: &str) -> PathBuf {
        self.root.join(format!("{tenant}.{DB_EXTENSION}"))
    }

    /// Return the engine for `tenant`, opening its file on first use.
    ///
    /// A failed open leaves the slot empty, so the next call tries again.
    pub fn ensure_engine(&self, tenant: &str) -> Result<Arc<Engine<P>>> {
        let existing = self.engines.read().get(tenant).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                validate_tenant(tenant)?;
                Arc::clone(self.engines.write().entry(tenant.to_string()).or_default())
            }
        };

        let mut slot = slot.lock();
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let path = self.tenant_path(tenant);
        let engine = Arc::new(Engine::open(&path)?);
        info!(tenant, path = %path.display(), "tenant opened");
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Tenant names, sorted.
    ///
    /// `physical` scans the data directory for database files; otherwise only
    /// tenants opened by this registry are listed. The two can differ: a file
    /// may exist on disk without having been opened in this run.
    pub fn list_tenants(&self, physical: bool) -> Result<Vec<String>> {
        let mut tenants = if physical {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(&self.root)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == DB_EXTENSION) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        found.push(stem.to_string());
                    }
                }
            }
            found
        } else {
            self.engines
                .read()
                .iter()
                .filter(|(_, slot)| slot.lock().is_some())
                .map(|(tenant, _)| tenant.clone())
                .collect()
        };
        tenants.sort();
        Ok(tenants)
    }

    /// Close every open engine and forget it.
    pub fn close_all(&self) -> Result<()> {
        let slots: Vec<_> = self.engines.write().drain().collect();
        let mut first_err = None;
        for engine in slots.into_iter().filter_map(|(_, slot)| slot.lock().take()) {
            if let Err(e) = engine.close() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Tenant names become file names.
fn validate_tenant(tenant: &str) -> Result<()> {
    let unsafe_name = tenant.is_empty()
        || tenant == "."
        || tenant == ".."
        || tenant.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(Error::Validation(format!("invalid tenant name {tenant:?}")));
    }
    Ok(())
}
