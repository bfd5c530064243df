//! Driver discovery and lookup
//!
//! The registry scans one directory for `*.yaml`, `*.yml` and `*.json`
//! driver files the first time any lookup needs them. Results are kept
//! until [`DriverRegistry::reload`]. A file that fails to parse or validate
//! is logged and skipped; the rest still load.

use super::{DriverConfig, DriverFormat};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct RegistryState {
    discovered: bool,
    drivers: BTreeMap<String, Arc<DriverConfig>>,
}

/// Summary of the registered drivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_drivers: usize,
    pub driver_names: Vec<String>,
    pub source_types: Vec<String>,
    pub target_types: Vec<String>,
}

/// Process-wide driver cache with an explicit reload
#[derive(Debug)]
pub struct DriverRegistry {
    directory: Option<PathBuf>,
    create_if_missing: bool,
    state: Mutex<RegistryState>,
    parse_count: AtomicUsize,
}

impl DriverRegistry {
    /// Registry discovering drivers in `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            create_if_missing: false,
            state: Mutex::new(RegistryState::default()),
            parse_count: AtomicUsize::new(0),
        }
    }

    /// Registry without a directory; drivers come from [`Self::register`]
    pub fn empty() -> Self {
        Self {
            directory: None,
            create_if_missing: false,
            state: Mutex::new(RegistryState::default()),
            parse_count: AtomicUsize::new(0),
        }
    }

    /// Create the driver directory on first discovery if it is missing
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Number of driver files parsed so far
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a driver under its own name
    pub fn register(&self, driver: DriverConfig) -> Arc<DriverConfig> {
        let driver = Arc::new(driver);
        self.lock()
            .drivers
            .insert(driver.name.clone(), Arc::clone(&driver));
        driver
    }

    /// Parse and validate one driver file without registering it
    pub fn load_from_file(&self, path: &Path) -> Result<DriverConfig> {
        if !path.is_file() {
            return Err(Error::config(
                path.display().to_string(),
                "driver file not found",
            ));
        }
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        DriverConfig::load(path)
    }

    /// Scan the directory once; later calls are no-ops until [`Self::reload`]
    pub fn discover(&self) {
        let mut state = self.lock();
        self.discover_locked(&mut state);
    }

    /// Forget every driver and scan again
    pub fn reload(&self) {
        let mut state = self.lock();
        state.drivers.clear();
        state.discovered = false;
        self.discover_locked(&mut state);
    }

    // The caller holds the lock for the whole scan, so concurrent first
    // lookups wait for one discovery instead of racing.
    fn discover_locked(&self, state: &mut RegistryState) {
        if state.discovered {
            return;
        }
        state.discovered = true;

        let Some(dir) = &self.directory else {
            return;
        };

        if !dir.exists() {
            if self.create_if_missing {
                match std::fs::create_dir_all(dir) {
                    Ok(()) => debug!(path = %dir.display(), "created driver directory"),
                    Err(e) => warn!(path = %dir.display(), error = %e, "cannot create driver directory"),
                }
            } else {
                debug!(path = %dir.display(), "driver directory does not exist");
            }
            return;
        }

        let files = match driver_files(dir) {
            Ok(files) => files,
            Err(e) => {
                error!(path = %dir.display(), error = %e, "cannot read driver directory");
                return;
            }
        };

        for file in files {
            match self.load_from_file(&file) {
                Ok(driver) => {
                    if let Some(previous) = state.drivers.get(&driver.name) {
                        warn!(
                            driver = %driver.name,
                            path = %file.display(),
                            previous = ?previous.path,
                            "duplicate driver name, later file wins"
                        );
                    }
                    debug!(driver = %driver.name, path = %file.display(), "driver registered");
                    state.drivers.insert(driver.name.clone(), Arc::new(driver));
                }
                Err(e) => error!(path = %file.display(), error = %e, "failed to load driver"),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<DriverConfig>> {
        let mut state = self.lock();
        self.discover_locked(&mut state);
        state.drivers.get(name).cloned()
    }

    /// Like [`Self::get`], but an unknown name is an error
    pub fn require(&self, name: &str) -> Result<Arc<DriverConfig>> {
        self.get(name)
            .ok_or_else(|| Error::DriverNotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All drivers, ordered by name
    pub fn all(&self) -> Vec<Arc<DriverConfig>> {
        let mut state = self.lock();
        self.discover_locked(&mut state);
        state.drivers.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut state = self.lock();
        self.discover_locked(&mut state);
        state.drivers.keys().cloned().collect()
    }

    /// Drivers declaring `source` as their source type
    pub fn get_by_source(&self, source: &str) -> Vec<Arc<DriverConfig>> {
        self.all()
            .into_iter()
            .filter(|d| d.source == source)
            .collect()
    }

    /// Drivers declaring `target` as their target type
    pub fn get_by_target(&self, target: &str) -> Vec<Arc<DriverConfig>> {
        self.all()
            .into_iter()
            .filter(|d| d.target == target)
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let drivers = self.all();
        let mut source_types: Vec<String> = drivers.iter().map(|d| d.source.clone()).collect();
        source_types.sort();
        source_types.dedup();
        let mut target_types: Vec<String> = drivers.iter().map(|d| d.target.clone()).collect();
        target_types.sort();
        target_types.dedup();

        RegistryStats {
            total_drivers: drivers.len(),
            driver_names: drivers.iter().map(|d| d.name.clone()).collect(),
            source_types,
            target_types,
        }
    }
}

/// Driver files directly inside `dir`, sorted by path
fn driver_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && DriverFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
