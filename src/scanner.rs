//! Discovery of live server processes.
//!
//! The OS process table sits behind [`ProcessTable`] so the filtering rules can
//! be exercised without real processes. Inspection failures are reported per
//! process in the [`ScanReport`] instead of failing the scan.

use std::path::PathBuf;

use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use crate::error::InstanceError;

/// A live process that passed the scan filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedProcess {
    pub pid: u32,
    pub name: String,
    /// Raw argv as reported by the OS.
    pub cmdline: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Why a process was left out of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Vanished,
    AccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedProcess {
    pub pid: u32,
    pub reason: SkipReason,
}

impl From<SkippedProcess> for InstanceError {
    fn from(skip: SkippedProcess) -> Self {
        match skip.reason {
            SkipReason::Vanished => InstanceError::ProcessVanished { pid: skip.pid },
            SkipReason::AccessDenied => InstanceError::AccessDenied { pid: skip.pid },
        }
    }
}

/// One entry of a process-table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub inspected: Result<Inspected, SkipReason>,
}

/// Details that require reading the process beyond its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspected {
    pub cmdline: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Source of process-table snapshots.
pub trait ProcessTable {
    fn snapshot(&mut self) -> Vec<ProcessEntry>;
}

/// Filter applied to every process in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Matched case-insensitively against the process name.
    pub name_marker: String,
    /// Each must be contained in at least one argv token.
    pub required: [String; 2],
}

impl ScanFilter {
    pub fn new(name_marker: impl Into<String>, first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            name_marker: name_marker.into(),
            required: [first.into(), second.into()],
        }
    }

    fn name_matches(&self, name: &str) -> bool {
        name.to_uppercase()
            .contains(&self.name_marker.to_uppercase())
    }

    fn cmdline_matches(&self, cmdline: &[String]) -> bool {
        self.required
            .iter()
            .all(|needle| cmdline.iter().any(|token| token.contains(needle.as_str())))
    }
}

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub processes: Vec<ScannedProcess>,
    pub skipped: Vec<SkippedProcess>,
}

/// Enumerates `table` and keeps the processes accepted by `filter`.
pub fn scan(table: &mut impl ProcessTable, filter: &ScanFilter) -> ScanReport {
    let mut report = ScanReport::default();
    for entry in table.snapshot() {
        if !filter.name_matches(&entry.name) {
            continue;
        }
        match entry.inspected {
            Ok(inspected) => {
                if filter.cmdline_matches(&inspected.cmdline) {
                    report.processes.push(ScannedProcess {
                        pid: entry.pid,
                        name: entry.name,
                        cmdline: inspected.cmdline,
                        cwd: inspected.cwd,
                    });
                }
            }
            Err(reason) => {
                let skip = SkippedProcess {
                    pid: entry.pid,
                    reason,
                };
                debug!(error = %InstanceError::from(skip), "skipping process");
                report.skipped.push(skip);
            }
        }
    }
    report.processes.sort_by_key(|process| process.pid);
    report
}

/// Process table backed by the operating system.
pub struct SystemProcessTable {
    system: System,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn snapshot(&mut self) -> Vec<ProcessEntry> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_cwd(UpdateKind::Always),
        );
        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let name = process.name().to_string_lossy().to_string();
                let inspected = if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
                    Err(SkipReason::Vanished)
                } else if process.cmd().is_empty() {
                    // The kernel hides argv of processes we may not inspect.
                    Err(SkipReason::AccessDenied)
                } else {
                    Ok(Inspected {
                        cmdline: process
                            .cmd()
                            .iter()
                            .map(|arg| arg.to_string_lossy().to_string())
                            .collect(),
                        cwd: process.cwd().map(|cwd| cwd.to_path_buf()),
                    })
                };
                ProcessEntry {
                    pid: pid.as_u32(),
                    name,
                    inspected,
                }
            })
            .collect()
    }
}
