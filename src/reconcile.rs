//! Reconciliation of live processes with declared instances.
//!
//! A declared instance and a live process are the same instance only when
//! their normalized command lines are equal token for token.

use tracing::debug;

use crate::config::{DeclaredInstance, Registry};
use crate::context::Context;
use crate::error::InstanceError;
use crate::flags::normalize;
use crate::process::MergedInstanceView;
use crate::scanner::{scan, ProcessTable, ScanReport, ScannedProcess};

/// Merges a scan with the declared instances.
///
/// Declared instances come first in registry order, running when a live
/// process matches and stopped otherwise; unmatched live processes follow as
/// unnamed entries. Declared instances repeating an earlier command line are
/// folded into the earlier entry.
pub fn reconcile(
    ctx: &Context,
    scanned: &[ScannedProcess],
    declared: &[DeclaredInstance],
) -> Vec<MergedInstanceView> {
    let scanned_keys: Vec<Vec<String>> = scanned
        .iter()
        .map(|process| normalize(&process.cmdline))
        .collect();
    let mut claimed = vec![false; scanned.len()];
    let mut declared_keys: Vec<Vec<String>> = Vec::with_capacity(declared.len());
    let mut views = Vec::with_capacity(declared.len() + scanned.len());

    for instance in declared {
        let expected = ctx.expected_cmdline(&instance.args);
        let key = normalize(&expected);
        if declared_keys.contains(&key) {
            debug!(instance = %instance.name, "command line already declared by an earlier instance");
            continue;
        }

        let mut matched = false;
        for (idx, process) in scanned.iter().enumerate() {
            if claimed[idx] || scanned_keys[idx] != key {
                continue;
            }
            claimed[idx] = true;
            matched = true;
            debug!(instance = %instance.name, pid = process.pid, "matched running instance");
            views.push(MergedInstanceView::running(
                process.pid,
                Some(instance.name.clone()),
                process.cmdline.clone(),
                process.cwd.clone(),
                &ctx.workdir,
            ));
        }
        if !matched {
            views.push(MergedInstanceView::stopped(
                instance.name.clone(),
                expected,
                ctx.workdir.clone(),
            ));
        }
        declared_keys.push(key);
    }

    for (idx, process) in scanned.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        views.push(MergedInstanceView::running(
            process.pid,
            None,
            process.cmdline.clone(),
            process.cwd.clone(),
            &ctx.workdir,
        ));
    }
    views
}

/// One refresh cycle: registry reload, process scan, reconciliation.
pub struct Discovery<'a, T: ProcessTable> {
    ctx: &'a Context,
    registry: Registry,
    table: T,
    last_scan: ScanReport,
}

impl<'a, T: ProcessTable> Discovery<'a, T> {
    pub fn new(ctx: &'a Context, registry: Registry, table: T) -> Self {
        Self {
            ctx,
            registry,
            table,
            last_scan: ScanReport::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Skips recorded by the most recent scan.
    pub fn last_scan(&self) -> &ScanReport {
        &self.last_scan
    }

    /// Produces a fresh snapshot of all instances.
    pub fn refresh(&mut self) -> Result<Vec<MergedInstanceView>, InstanceError> {
        self.registry.reload()?;
        self.last_scan = scan(&mut self.table, &self.ctx.filter);
        let views = reconcile(self.ctx, &self.last_scan.processes, self.registry.instances());
        debug!(
            instances = views.len(),
            skipped = self.last_scan.skipped.len(),
            "refreshed instances"
        );
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::attributes::Protocol;
    use crate::config::CONFIG_FILENAME;
    use crate::context::tests::test_context;
    use crate::scanner::tests::{entry, FakeTable};

    fn process(pid: u32, cmdline: &str) -> ScannedProcess {
        ScannedProcess {
            pid,
            name: "python3".to_string(),
            cmdline: cmdline.split_whitespace().map(str::to_string).collect(),
            cwd: Some(PathBuf::from("/home/web")),
        }
    }

    #[test]
    fn lone_stopped_minimal_instance() {
        let ctx = test_context();
        let views = reconcile(&ctx, &[], &[DeclaredInstance::new("MINIMAL", "")]);
        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert!(view.is_stopped());
        assert_eq!(view.pid, None);
        assert_eq!(view.instance_name.as_deref(), Some("MINIMAL"));
        assert_eq!(view.attributes.port, "8000");
        assert_eq!(view.attributes.protocol, Protocol::Http);
        assert_eq!(view.attributes.url_prefix, "");
        assert_eq!(view.cwd, Some(ctx.workdir.clone()));
    }

    #[test]
    fn matching_process_collapses_into_one_running_entry() {
        let ctx = test_context();
        let declared = [
            DeclaredInstance::new("MINIMAL", ""),
            DeclaredInstance::new("STANDARD", "apps -L 20"),
        ];
        let scanned = [process(321, "python3 ./py4web.py run apps -L 20")];
        let views = reconcile(&ctx, &scanned, &declared);

        assert_eq!(views.len(), 2);
        assert!(views[0].is_stopped());
        let standard = &views[1];
        assert_eq!(standard.instance_name.as_deref(), Some("STANDARD"));
        assert!(!standard.is_stopped());
        assert_eq!(standard.pid, Some(321));
        assert_eq!(standard.cwd, Some(PathBuf::from("/home/web")));
        assert_eq!(standard.attributes.log_level, "20");
    }

    #[test]
    fn running_process_attributes_are_derived() {
        let ctx = test_context();
        let scanned = [process(
            77,
            "python3 ./py4web.py run apps -P 9090 --ssl_cert cert.pem",
        )];
        let views = reconcile(&ctx, &scanned, &[]);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].instance_name, None);
        assert_eq!(views[0].attributes.port, "9090");
        assert_eq!(views[0].attributes.protocol, Protocol::Https);
    }

    #[test]
    fn different_flag_values_never_share_an_entry() {
        let ctx = test_context();
        let declared = [
            DeclaredInstance::new("A", "apps -P 9000"),
            DeclaredInstance::new("B", "apps -P 9001"),
        ];
        let scanned = [process(10, "python3 ./py4web.py run apps -P 9000")];
        let views = reconcile(&ctx, &scanned, &declared);

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].instance_name.as_deref(), Some("A"));
        assert_eq!(views[0].pid, Some(10));
        assert_eq!(views[1].instance_name.as_deref(), Some("B"));
        assert!(views[1].is_stopped());
        assert_eq!(views[1].attributes.port, "9001");
    }

    #[test]
    fn order_and_length_must_match_exactly() {
        let ctx = test_context();
        let declared = [DeclaredInstance::new("A", "apps -L 20 -P 9000")];
        let scanned = [
            process(1, "python3 ./py4web.py run apps -P 9000 -L 20"),
            process(2, "python3 ./py4web.py run apps -L 20"),
        ];
        let views = reconcile(&ctx, &scanned, &declared);

        assert_eq!(views.len(), 3);
        assert!(views[0].is_stopped());
        assert_eq!(views[1].pid, Some(1));
        assert_eq!(views[2].pid, Some(2));
        assert!(views[1].instance_name.is_none() && views[2].instance_name.is_none());
    }

    #[test]
    fn embedded_flag_values_match_after_normalization() {
        let ctx = test_context();
        let declared = [DeclaredInstance::new("A", "apps --port=9000")];
        let scanned = [process(5, "python3 ./py4web.py run apps --port=9000")];
        let views = reconcile(&ctx, &scanned, &declared);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].pid, Some(5));
        assert_eq!(views[0].attributes.port, "9000");
    }

    #[test]
    fn repeated_declarations_fold_into_first() {
        let ctx = test_context();
        let declared = [
            DeclaredInstance::new("FIRST", "apps"),
            DeclaredInstance::new("SECOND", "apps"),
        ];
        let views = reconcile(&ctx, &[], &declared);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].instance_name.as_deref(), Some("FIRST"));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let ctx = test_context();
        let declared = [
            DeclaredInstance::new("MINIMAL", ""),
            DeclaredInstance::new("STANDARD", "apps -L 20"),
        ];
        let scanned = [
            process(3, "python3 ./py4web.py run apps -L 20"),
            process(4, "python3 /opt/py4web.py run other"),
        ];
        let first = reconcile(&ctx, &scanned, &declared);
        let second = reconcile(&ctx, &scanned, &declared);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn discovery_refresh_runs_a_full_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let ctx = test_context();
        let registry = Registry::open(&path).unwrap();
        let table = FakeTable(vec![
            entry(900, "python3", "python3 ./py4web.py run -L 20"),
            entry(901, "bash", "bash"),
        ]);
        let mut discovery = Discovery::new(&ctx, registry, table);

        let views = discovery.refresh().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].instance_name.as_deref(), Some("MINIMAL"));
        assert!(views[0].is_stopped());
        assert_eq!(views[1].instance_name.as_deref(), Some("STANDARD"));
        assert_eq!(views[1].pid, Some(900));
        assert_eq!(discovery.refresh().unwrap(), views);
    }
}
