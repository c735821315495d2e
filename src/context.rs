//! Shared, read-only context for discovery and lifecycle operations.
//!
//! Built once at startup from the resolved settings and passed by reference
//! to the registry, the scanner and the lifecycle controller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scanner::ScanFilter;

/// Subcommand that turns a launcher invocation into a server.
pub const RUN_SUBCOMMAND: &str = "run";

/// Delays and timeouts used by lifecycle actions and log polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Grace period after spawning before discovery runs again.
    pub settle_delay: Duration,
    /// Upper bound on waiting for a terminated process to exit.
    pub stop_timeout: Duration,
    /// Upper bound on a single TCP connect probe.
    pub probe_timeout: Duration,
    /// Interval between full re-reads of a watched log file.
    pub log_poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(3000),
            stop_timeout: Duration::from_millis(3000),
            probe_timeout: Duration::from_millis(500),
            log_poll: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    /// Launcher invocation, already split on whitespace.
    pub launcher: Vec<String>,
    /// Directory new instances are started from.
    pub workdir: PathBuf,
    pub filter: ScanFilter,
    pub timings: Timings,
}

impl Context {
    pub fn new(launcher: &str, workdir: PathBuf, filter: ScanFilter, timings: Timings) -> Self {
        Self {
            launcher: launcher.split_whitespace().map(str::to_string).collect(),
            workdir,
            filter,
            timings,
        }
    }

    /// Full command line a declared argument string would be started with.
    pub fn expected_cmdline(&self, args: &str) -> Vec<String> {
        self.launcher
            .iter()
            .cloned()
            .chain(std::iter::once(RUN_SUBCOMMAND.to_string()))
            .chain(args.split_whitespace().map(str::to_string))
            .collect()
    }

    /// Resolves `path` against `base`, or the context directory when `base` is unknown.
    pub fn resolve(&self, base: Option<&Path>, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        base.unwrap_or(&self.workdir).join(path)
    }
}

/// Picks the launcher used when none is configured.
pub fn default_launcher() -> String {
    let python = if which::which("python3").is_ok() {
        "python3"
    } else {
        "python"
    };
    if cfg!(windows) {
        format!("{} py4web.py", python)
    } else {
        format!("{} ./py4web.py", python)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_context() -> Context {
        Context::new(
            "python3 ./py4web.py",
            PathBuf::from("/srv/py4web"),
            ScanFilter::new("python", "py4web", "run"),
            Timings::default(),
        )
    }

    #[test]
    fn expected_cmdline_prepends_launcher_and_run() {
        let ctx = test_context();
        assert_eq!(
            ctx.expected_cmdline("apps  -L 20"),
            vec!["python3", "./py4web.py", "run", "apps", "-L", "20"]
        );
        assert_eq!(ctx.expected_cmdline(""), vec!["python3", "./py4web.py", "run"]);
    }

    #[test]
    fn resolve_prefers_base_then_workdir() {
        let ctx = test_context();
        assert_eq!(
            ctx.resolve(Some(Path::new("/home/a")), Path::new("password.txt")),
            PathBuf::from("/home/a/password.txt")
        );
        assert_eq!(
            ctx.resolve(None, Path::new("password.txt")),
            PathBuf::from("/srv/py4web/password.txt")
        );
        assert_eq!(
            ctx.resolve(Some(Path::new("/home/a")), Path::new("/etc/pw")),
            PathBuf::from("/etc/pw")
        );
    }
}
