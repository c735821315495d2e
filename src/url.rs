//! Homepage and dashboard URLs, and the password file they depend on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::attributes::Protocol;
use crate::context::Context;
use crate::error::InstanceError;
use crate::process::MergedInstanceView;

/// Path of the administrative dashboard below the URL prefix.
pub const DASHBOARD_PATH: &str = "/_dashboard";

pub fn build_url(protocol: Protocol, port: &str, url_prefix: &str, path: &str) -> String {
    format!("{}://localhost:{}{}{}", protocol, port, url_prefix, path)
}

pub fn homepage_url(view: &MergedInstanceView) -> Result<String, InstanceError> {
    ensure_running(view)?;
    let attrs = &view.attributes;
    Ok(build_url(attrs.protocol, &attrs.port, &attrs.url_prefix, ""))
}

/// Dashboard URL of a running instance whose password file exists.
pub fn dashboard_url(ctx: &Context, view: &MergedInstanceView) -> Result<String, InstanceError> {
    ensure_running(view)?;
    let path = password_file_path(ctx, view);
    if !path.is_file() {
        return Err(InstanceError::PasswordFileMissing { path });
    }
    let attrs = &view.attributes;
    Ok(build_url(
        attrs.protocol,
        &attrs.port,
        &attrs.url_prefix,
        DASHBOARD_PATH,
    ))
}

/// Password file of an instance, resolved against its working directory.
pub fn password_file_path(ctx: &Context, view: &MergedInstanceView) -> PathBuf {
    ctx.resolve(view.cwd.as_deref(), Path::new(&view.attributes.password_file))
}

pub fn open_in_browser(url: &str) -> Result<(), InstanceError> {
    open::that(url).map_err(|source| InstanceError::Browser {
        url: url.to_string(),
        source,
    })
}

/// Writes `password` into `path` using the launcher's `set_password` command.
pub async fn set_password(ctx: &Context, path: &Path, password: &str) -> Result<(), InstanceError> {
    let credential_error = |reason: String| InstanceError::Credential {
        path: path.to_path_buf(),
        reason,
    };
    let Some((program, launcher_args)) = ctx.launcher.split_first() else {
        return Err(credential_error("no launcher configured".to_string()));
    };
    let status = Command::new(program)
        .args(launcher_args)
        .arg("set_password")
        .arg("--password")
        .arg(password)
        .arg("-p")
        .arg(path)
        .current_dir(&ctx.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await
        .map_err(|err| credential_error(err.to_string()))?;
    if !status.success() {
        return Err(credential_error(format!(
            "set_password exited {}",
            status.code().unwrap_or(1)
        )));
    }
    info!(path = %path.display(), "password file written");
    Ok(())
}

fn ensure_running(view: &MergedInstanceView) -> Result<(), InstanceError> {
    if view.is_stopped() {
        return Err(InstanceError::NotRunning {
            name: view.display_name().to_string(),
        });
    }
    Ok(())
}
