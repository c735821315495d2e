//! Starting and stopping instances.
//!
//! Both actions end with a rescan in every outcome branch, and the snapshot it
//! produced is handed back next to the outcome in an [`ActionReport`].

use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::InstanceError;
use crate::process::MergedInstanceView;

/// Where a started instance writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Share the caller's stdin/stdout/stderr.
    Inherit,
    /// Detach all standard streams.
    Discard,
}

/// Successful lifecycle outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSuccess {
    Started { pid: u32 },
    Stopped { pid: u32 },
}

/// Outcome of a lifecycle action plus the rescan that followed it.
#[derive(Debug)]
pub struct ActionReport<T> {
    pub outcome: Result<ActionSuccess, InstanceError>,
    pub snapshot: T,
}

/// Returns true when something accepts TCP connections on `localhost:port`.
pub async fn probe_port(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("localhost", port))).await,
        Ok(Ok(_))
    )
}

/// Starts and stops instances using the timings of a [`Context`].
pub struct Controller<'a> {
    ctx: &'a Context,
}

impl<'a> Controller<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Spawns a stopped instance, waits the settling delay and rescans.
    ///
    /// The settling delay does not guarantee the instance is listening by the
    /// time `rescan` runs; a slow start still shows up as stopped.
    pub async fn start<F, T>(
        &self,
        view: &MergedInstanceView,
        console: ConsoleMode,
        rescan: F,
    ) -> ActionReport<T>
    where
        F: FnOnce() -> T,
    {
        let outcome = self.spawn_instance(view, console).await;
        if outcome.is_ok() {
            tokio::time::sleep(self.ctx.timings.settle_delay).await;
        }
        ActionReport {
            outcome,
            snapshot: rescan(),
        }
    }

    /// Terminates `pid`, waits for it to exit and rescans.
    pub async fn stop<F, T>(&self, pid: u32, rescan: F) -> ActionReport<T>
    where
        F: FnOnce() -> T,
    {
        let outcome = self.terminate(pid).await;
        if let Err(err) = &outcome {
            warn!(pid, error = %err, "stop failed");
        }
        ActionReport {
            outcome,
            snapshot: rescan(),
        }
    }

    async fn spawn_instance(
        &self,
        view: &MergedInstanceView,
        console: ConsoleMode,
    ) -> Result<ActionSuccess, InstanceError> {
        if let Some(pid) = view.pid {
            return Err(InstanceError::AlreadyRunning {
                name: view.display_name().to_string(),
                pid,
            });
        }
        let port = view
            .attributes
            .port_number()
            .ok_or_else(|| InstanceError::InvalidPort {
                value: view.attributes.port.clone(),
            })?;
        if probe_port(port, self.ctx.timings.probe_timeout).await {
            return Err(InstanceError::PortInUse { port });
        }

        let Some((program, args)) = view.cmdline.split_first() else {
            return Err(InstanceError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
            });
        };
        let mut command = Command::new(program);
        command.args(args).current_dir(&self.ctx.workdir);
        if console == ConsoleMode::Discard {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        // Own process group, so terminal signals aimed at us do not reach it.
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let child = command.spawn().map_err(|source| InstanceError::Spawn {
            command: view.command_line(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);
        info!(instance = view.display_name(), pid, port, "started instance");
        Ok(ActionSuccess::Started { pid })
    }

    async fn terminate(&self, pid: u32) -> Result<ActionSuccess, InstanceError> {
        send_terminate(pid)?;
        let timeout = self.ctx.timings.stop_timeout;
        match tokio::time::timeout(timeout, wait_for_exit(pid)).await {
            Ok(()) => {
                info!(pid, "stopped instance");
                Ok(ActionSuccess::Stopped { pid })
            }
            Err(_) => Err(InstanceError::TerminateTimeout { pid, timeout }),
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<(), InstanceError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Err(InstanceError::NoSuchProcess { pid });
    };
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::EPERM) => Err(InstanceError::AccessDenied { pid }),
        _ => Err(InstanceError::NoSuchProcess { pid }),
    }
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) -> Result<(), InstanceError> {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    let Some(process) = system.process(target) else {
        return Err(InstanceError::NoSuchProcess { pid });
    };
    let sent = process
        .kill_with(sysinfo::Signal::Term)
        .unwrap_or_else(|| process.kill());
    if sent {
        Ok(())
    } else {
        Err(InstanceError::AccessDenied { pid })
    }
}

// Polls until the process is gone or only a zombie is left.
async fn wait_for_exit(pid: u32) {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    loop {
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        let alive = system
            .process(target)
            .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead));
        if !alive {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
