//! Crash reporting
//!
//! When enabled in the manifest, a panic anywhere in the host writes a JSON
//! report to the configured directory before the default hook runs.

use ext_csp::RuntimeMode;
use serde::Serialize;
use std::fs;
use std::panic;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct CrashReporter {
    dir: PathBuf,
    app_name: String,
    app_version: String,
    mode: RuntimeMode,
}

#[derive(Debug, Serialize)]
struct CrashReport<'a> {
    timestamp: String,
    app: &'a str,
    version: &'a str,
    mode: RuntimeMode,
    os: &'static str,
    arch: &'static str,
    hostname: String,
    location: &'a str,
    message: &'a str,
    backtrace: String,
}

impl CrashReporter {
    pub fn new(
        dir: impl Into<PathBuf>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        mode: RuntimeMode,
    ) -> Self {
        Self {
            dir: dir.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
            mode,
        }
    }

    /// Install the panic hook. The previous hook still runs afterwards.
    pub fn install(self) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to create crash report directory"
            );
        }
        info!(dir = %self.dir.display(), "Crash reporting enabled");

        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            self.handle_panic(panic_info);
            default_hook(panic_info);
        }));
    }

    fn handle_panic(&self, panic_info: &panic::PanicHookInfo) {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = panic_message(panic_info.payload());
        let backtrace = backtrace::Backtrace::new();

        error!(%location, %message, "PANIC");
        if let Err(e) = self.write_report(&message, &location, &backtrace) {
            error!(error = %e, "Failed to write crash report");
        }
    }

    /// Write one report and return its path
    pub fn write_report(
        &self,
        message: &str,
        location: &str,
        backtrace: &backtrace::Backtrace,
    ) -> std::io::Result<PathBuf> {
        let now = chrono::Utc::now();
        let report = CrashReport {
            timestamp: now.to_rfc3339(),
            app: &self.app_name,
            version: &self.app_version,
            mode: self.mode,
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            location,
            message,
            backtrace: format!("{:?}", backtrace),
        };
        let body = serde_json::to_vec_pretty(&report)?;

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!(
            "crash-{}-{}.json",
            sanitize(&self.app_name),
            now.format("%Y%m%d-%H%M%S%.3f")
        ));
        fs::write(&path, body)?;
        info!(path = %path.display(), "Crash report written");
        Ok(path)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
