//! Data structures for the reconciled instance list.
//!
//! A [`MergedInstanceView`] is what the dashboard and the lifecycle controller
//! act on. Views are rebuilt on every refresh; they are never updated in place.

use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::attributes::InstanceAttributes;

/// Label shown for live processes that match no declared instance.
pub const UNNAMED_INSTANCE: &str = "-";

/// One entry of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedInstanceView {
    /// Process ID, present only for running entries.
    pub pid: Option<u32>,
    /// Declared instance name, or `None` for an unnamed live process.
    pub instance_name: Option<String>,
    /// Command line the entry runs (or would be started) with.
    pub cmdline: Vec<String>,
    /// Working directory of the process, or the start directory when stopped.
    pub cwd: Option<PathBuf>,
    pub attributes: InstanceAttributes,
}

impl Serialize for MergedInstanceView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MergedInstanceView", 6)?;
        state.serialize_field("pid", &self.pid)?;
        state.serialize_field("instance_name", &self.instance_name)?;
        state.serialize_field("cmdline", &self.cmdline)?;
        state.serialize_field("cwd", &self.cwd)?;
        state.serialize_field("attributes", &self.attributes)?;
        state.serialize_field("stopped", &self.is_stopped())?;
        state.end()
    }
}

impl MergedInstanceView {
    /// `fallback_dir` stands in for `cwd` when the process directory could not be read.
    pub fn running(
        pid: u32,
        instance_name: Option<String>,
        cmdline: Vec<String>,
        cwd: Option<PathBuf>,
        fallback_dir: &Path,
    ) -> Self {
        let attributes =
            InstanceAttributes::derive(&cmdline, Some(cwd.as_deref().unwrap_or(fallback_dir)));
        Self {
            pid: Some(pid),
            instance_name,
            cmdline,
            cwd,
            attributes,
        }
    }

    pub fn stopped(instance_name: String, cmdline: Vec<String>, cwd: PathBuf) -> Self {
        let attributes = InstanceAttributes::derive(&cmdline, Some(&cwd));
        Self {
            pid: None,
            instance_name: Some(instance_name),
            cmdline,
            cwd: Some(cwd),
            attributes,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.pid.is_none()
    }

    pub fn display_name(&self) -> &str {
        self.instance_name.as_deref().unwrap_or(UNNAMED_INSTANCE)
    }

    /// Command line joined for display, quoting tokens that contain spaces.
    pub fn command_line(&self) -> String {
        shell_words::join(&self.cmdline)
    }

    /// Whether `selector` names this entry, either by instance name or by pid.
    pub fn matches_selector(&self, selector: &str) -> bool {
        if self.instance_name.as_deref() == Some(selector) {
            return true;
        }
        match (self.pid, selector.parse::<u32>()) {
            (Some(pid), Ok(wanted)) => pid == wanted,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmdline(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn stopped_iff_pid_absent() {
        let running = MergedInstanceView::running(
            5,
            None,
            cmdline("python3 py4web.py run apps"),
            None,
            Path::new("/srv"),
        );
        assert!(!running.is_stopped());
        assert_eq!(running.pid, Some(5));
        assert_eq!(running.display_name(), UNNAMED_INSTANCE);

        let stopped = MergedInstanceView::stopped(
            "MINIMAL".to_string(),
            cmdline("python3 py4web.py run"),
            PathBuf::from("/srv"),
        );
        assert!(stopped.is_stopped());
        assert_eq!(stopped.pid, None);
    }

    #[test]
    fn stopped_state_follows_pid_when_serialized() {
        let mut view = MergedInstanceView::running(
            5,
            Some("STANDARD".to_string()),
            cmdline("python3 py4web.py run apps -L 20"),
            Some(PathBuf::from("/srv")),
            Path::new("/srv"),
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["stopped"], serde_json::Value::Bool(false));
        assert_eq!(json["pid"], serde_json::json!(5));

        view.pid = None;
        assert!(view.is_stopped());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["stopped"], serde_json::Value::Bool(true));
        assert!(json["pid"].is_null());
    }

    #[test]
    fn unreadable_cwd_resolves_errorlog_against_fallback_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let view = MergedInstanceView::running(
            7,
            None,
            cmdline("python3 py4web.py run apps --errorlog logs"),
            None,
            dir.path(),
        );
        assert_eq!(
            view.attributes.error_log,
            Some(PathBuf::from("logs").join(crate::attributes::ERROR_LOG_FILENAME))
        );
    }

    #[test]
    fn selector_matches_name_or_pid() {
        let view = MergedInstanceView::running(
            4242,
            Some("STANDARD".to_string()),
            cmdline("python3 py4web.py run apps -L 20"),
            None,
            Path::new("/srv"),
        );
        assert!(view.matches_selector("STANDARD"));
        assert!(view.matches_selector("4242"));
        assert!(!view.matches_selector("MINIMAL"));
        assert!(!view.matches_selector("42"));
    }

    #[test]
    fn command_line_quotes_spaced_tokens() {
        let view = MergedInstanceView::running(
            1,
            None,
            vec!["python3".into(), "py4web.py".into(), "run".into(), "my apps".into()],
            None,
            Path::new("/srv"),
        );
        assert_eq!(view.command_line(), "python3 py4web.py run 'my apps'");
    }
}
