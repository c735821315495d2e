//! Error types for discovery and lifecycle operations.
//!
//! Scanner failures are recovered in place and only show up here when they are
//! logged. Lifecycle failures are returned to the caller as values so the
//! dashboard (or the CLI) decides how to report them.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the discovery engine and the lifecycle controller.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("process {pid} exited while it was being inspected")]
    ProcessVanished { pid: u32 },
    #[error("access denied to process {pid}")]
    AccessDenied { pid: u32 },
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },
    #[error("password file {} is missing", path.display())]
    PasswordFileMissing { path: PathBuf },
    #[error("no such process: {pid}")]
    NoSuchProcess { pid: u32 },
    #[error("process {pid} did not exit within {}ms", timeout.as_millis())]
    TerminateTimeout { pid: u32, timeout: Duration },
    #[error("failed to load {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },
    #[error("failed to save {}: {reason}", path.display())]
    ConfigSave { path: PathBuf, reason: String },
    #[error("duplicate instance name: {name}")]
    DuplicateDeclaredName { name: String },
    #[error("{name} is already running (pid {pid})")]
    AlreadyRunning { name: String, pid: u32 },
    #[error("{name} is not running")]
    NotRunning { name: String },
    #[error("invalid port {value:?}")]
    InvalidPort { value: String },
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open browser for {url}: {source}")]
    Browser {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to set password in {}: {reason}", path.display())]
    Credential { path: PathBuf, reason: String },
}

/// Flat classification of [`InstanceError`], used for structured reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProcessVanished,
    AccessDenied,
    PortInUse,
    PasswordFileMissing,
    NoSuchProcess,
    TerminateTimeout,
    ConfigLoad,
    ConfigSave,
    DuplicateDeclaredName,
    AlreadyRunning,
    NotRunning,
    InvalidPort,
    Spawn,
    Browser,
    Credential,
}

impl InstanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstanceError::ProcessVanished { .. } => ErrorKind::ProcessVanished,
            InstanceError::AccessDenied { .. } => ErrorKind::AccessDenied,
            InstanceError::PortInUse { .. } => ErrorKind::PortInUse,
            InstanceError::PasswordFileMissing { .. } => ErrorKind::PasswordFileMissing,
            InstanceError::NoSuchProcess { .. } => ErrorKind::NoSuchProcess,
            InstanceError::TerminateTimeout { .. } => ErrorKind::TerminateTimeout,
            InstanceError::ConfigLoad { .. } => ErrorKind::ConfigLoad,
            InstanceError::ConfigSave { .. } => ErrorKind::ConfigSave,
            InstanceError::DuplicateDeclaredName { .. } => ErrorKind::DuplicateDeclaredName,
            InstanceError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            InstanceError::NotRunning { .. } => ErrorKind::NotRunning,
            InstanceError::InvalidPort { .. } => ErrorKind::InvalidPort,
            InstanceError::Spawn { .. } => ErrorKind::Spawn,
            InstanceError::Browser { .. } => ErrorKind::Browser,
            InstanceError::Credential { .. } => ErrorKind::Credential,
        }
    }

    pub(crate) fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InstanceError::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn config_save(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InstanceError::ConfigSave {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_milliseconds() {
        let err = InstanceError::TerminateTimeout {
            pid: 42,
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "process 42 did not exit within 3000ms");
        assert_eq!(err.kind(), ErrorKind::TerminateTimeout);
    }
}
