//! Structured instance configuration derived from a command line.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::flags::{extract, has_switch, lookup, normalize};

/// File name the server writes inside an `--errorlog` directory.
pub const ERROR_LOG_FILENAME: &str = "server-py4web.log";

/// Transport scheme an instance serves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration an instance runs (or would run) with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceAttributes {
    pub port: String,
    pub protocol: Protocol,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub url_prefix: String,
    pub error_log: Option<PathBuf>,
    pub log_level: String,
    pub password_file: String,
    pub host: String,
    pub server: String,
    pub workers: String,
    pub dashboard_mode: String,
    pub watch: String,
    pub debug: bool,
    pub app_names: String,
}

impl InstanceAttributes {
    /// Derives attributes from a command line.
    ///
    /// `workdir` is only used to decide whether a relative `--errorlog` value
    /// names a directory.
    pub fn derive<S: AsRef<str>>(cmdline: &[S], workdir: Option<&Path>) -> Self {
        let tokens = normalize(cmdline);
        let ssl_cert = lookup(&tokens, "--ssl_cert", None).map(str::to_string);
        let protocol = if ssl_cert.is_some() {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let error_log = lookup(&tokens, "--errorlog", None).map(|raw| error_log_path(raw, workdir));

        Self {
            port: extract(&tokens, "-P", Some("--port"), "8000"),
            protocol,
            ssl_cert,
            ssl_key: lookup(&tokens, "--ssl_key", None).map(str::to_string),
            url_prefix: extract(&tokens, "-U", Some("--url_prefix"), ""),
            error_log,
            log_level: extract(&tokens, "-L", Some("--logging_level"), "30"),
            password_file: extract(&tokens, "-p", Some("--password_file"), "password.txt"),
            host: extract(&tokens, "-H", Some("--host"), "127.0.0.1"),
            server: extract(&tokens, "-s", Some("--server"), "default"),
            workers: extract(&tokens, "-w", Some("--number_workers"), "0"),
            dashboard_mode: extract(&tokens, "-d", Some("--dashboard_mode"), "full"),
            watch: extract(&tokens, "--watch", None, "lazy"),
            debug: has_switch(&tokens, "-D", Some("--debug")),
            app_names: extract(&tokens, "-A", Some("--app_names"), "all"),
        }
    }

    /// Parses the port field, which is kept verbatim from the command line.
    pub fn port_number(&self) -> Option<u16> {
        self.port.parse().ok()
    }
}

fn error_log_path(raw: &str, workdir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(raw);
    let on_disk = match workdir {
        Some(dir) if path.is_relative() => dir.join(&path),
        _ => path.clone(),
    };
    if on_disk.is_dir() {
        path.join(ERROR_LOG_FILENAME)
    } else {
        path
    }
}
