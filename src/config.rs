//! Configuration management for webrack.
//!
//! This module defines the structure of the `webrack.toml` file, which holds
//! both the optional runtime settings and the ordered list of declared
//! instances, and the [`Registry`] that loads, seeds and appends to it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::InstanceError;

/// Default registry file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "webrack.toml";

/// Top-level structure of `webrack.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Free-form document title.
    pub title: Option<String>,
    /// Document format version.
    pub version: Option<u32>,
    /// Launcher invocation placed before `run` (e.g. "python3 ./py4web.py").
    pub launcher: Option<String>,
    /// Substring matched against process names during discovery.
    pub name_marker: Option<String>,
    /// Delay after starting an instance before rescanning (milliseconds).
    pub settle_delay_ms: Option<u64>,
    /// Time to wait for a stopped instance to exit (milliseconds).
    pub stop_timeout_ms: Option<u64>,
    /// Timeout of the TCP port probe (milliseconds).
    pub probe_timeout_ms: Option<u64>,
    /// Log file refresh interval (milliseconds).
    pub log_poll_ms: Option<u64>,
    /// Declared instances, in display order.
    #[serde(rename = "instance", default)]
    pub instances: Vec<DeclaredInstance>,
}

/// A named launch variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeclaredInstance {
    /// Unique display name.
    pub name: String,
    /// Arguments appended after `run`.
    #[serde(default)]
    pub args: String,
}

impl DeclaredInstance {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
        }
    }
}

/// Instances seeded into a fresh registry.
pub fn default_instances() -> Vec<DeclaredInstance> {
    vec![
        DeclaredInstance::new("MINIMAL", ""),
        DeclaredInstance::new("STANDARD", "-L 20"),
    ]
}

/// Parses a configuration file without seeding or validating it.
pub fn load_config(path: &Path) -> Result<Config, InstanceError> {
    let raw = std::fs::read_to_string(path).map_err(|err| InstanceError::config_load(path, err))?;
    toml::from_str(&raw).map_err(|err| InstanceError::config_load(path, err))
}

/// Rejects registries that declare the same name twice.
pub fn ensure_unique_names(instances: &[DeclaredInstance]) -> Result<(), InstanceError> {
    let mut seen = HashSet::new();
    for instance in instances {
        if !seen.insert(instance.name.as_str()) {
            return Err(InstanceError::DuplicateDeclaredName {
                name: instance.name.clone(),
            });
        }
    }
    Ok(())
}

/// Snapshot of the declared instances stored in one configuration file.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    config: Config,
}

impl Registry {
    /// Loads the registry at `path`, creating it with the default instances
    /// when it does not exist or declares no instance yet.
    pub fn open(path: &Path) -> Result<Self, InstanceError> {
        let mut config = if path.exists() {
            load_config(path)?
        } else {
            Config {
                title: Some("webrack".to_string()),
                version: Some(1),
                ..Config::default()
            }
        };
        let seed = config.instances.is_empty();
        if seed {
            config.instances = default_instances();
        }
        ensure_unique_names(&config.instances)?;
        let registry = Self {
            path: path.to_path_buf(),
            config,
        };
        if seed {
            registry.save()?;
            info!(path = %path.display(), "created registry with default instances");
        }
        Ok(registry)
    }

    /// Re-reads the file this registry was opened from.
    pub fn reload(&mut self) -> Result<(), InstanceError> {
        *self = Self::open(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instances(&self) -> &[DeclaredInstance] {
        &self.config.instances
    }

    /// Adds an instance at the end of the registry and persists it.
    pub fn append(&mut self, instance: DeclaredInstance) -> Result<(), InstanceError> {
        if self.config.instances.iter().any(|existing| existing.name == instance.name) {
            return Err(InstanceError::DuplicateDeclaredName {
                name: instance.name,
            });
        }
        self.config.instances.push(instance);
        self.save()
    }

    fn save(&self) -> Result<(), InstanceError> {
        let raw = toml::to_string_pretty(&self.config)
            .map_err(|err| InstanceError::config_save(&self.path, err))?;
        std::fs::write(&self.path, raw).map_err(|err| InstanceError::config_save(&self.path, err))
    }
}
