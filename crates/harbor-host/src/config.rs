//! Command line and `manifest.app.toml` handling

use anyhow::{Context, Result};
use clap::Parser;
use ext_csp::RuntimeMode;
use ext_window::{platform_quits_on_last_window_closed, LifecycleConfig, WindowSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.app.toml";
pub const DEFAULT_BUNDLE_DIR: &str = "dist";

#[derive(Debug, Parser)]
#[command(name = "harbor", version, about = "Desktop host for a bundled web UI")]
pub struct Args {
    /// Directory containing manifest.app.toml and the UI bundle
    #[arg(long, default_value = ".")]
    pub app_dir: PathBuf,

    /// Run against the hot-reload tooling: relaxed policy and devtools
    #[arg(long)]
    pub dev: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Manifest {
    pub app: App,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub bundle: Bundle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    pub name: String,
    pub identifier: String,
    pub version: String,
    pub crash_reporting: Option<bool>,
    pub crash_report_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WindowSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Overrides the platform convention
    pub quit_on_last_window_closed: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Bundle {
    pub dir: Option<String>,
}

/// Everything the host needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub mode: RuntimeMode,
    pub app_dir: PathBuf,
    pub manifest: Manifest,
}

impl HostConfig {
    pub fn load(args: &Args) -> Result<Self> {
        let manifest_path = args.app_dir.join(MANIFEST_FILE);
        let manifest_txt = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("reading manifest at {}", manifest_path.display()))?;
        let manifest = parse_manifest(&manifest_txt)?;

        Ok(Self {
            mode: RuntimeMode::from_dev_flag(args.dev),
            app_dir: args.app_dir.clone(),
            manifest,
        })
    }

    pub fn window_spec(&self) -> WindowSpec {
        let mut spec = WindowSpec::new(&self.manifest.app.name);
        if let Some(width) = self.manifest.window.width {
            spec.width = width;
        }
        if let Some(height) = self.manifest.window.height {
            spec.height = height;
        }
        spec
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        let quit = self
            .manifest
            .window
            .quit_on_last_window_closed
            .unwrap_or_else(platform_quits_on_last_window_closed);
        LifecycleConfig::new(self.mode, self.window_spec()).with_quit_on_last_window_closed(quit)
    }

    pub fn bundle_dir(&self) -> PathBuf {
        let dir = self
            .manifest
            .bundle
            .dir
            .as_deref()
            .unwrap_or(DEFAULT_BUNDLE_DIR);
        resolve(&self.app_dir, dir)
    }

    pub fn crash_reporting(&self) -> bool {
        self.manifest.app.crash_reporting.unwrap_or(false)
    }

    pub fn crash_report_dir(&self) -> PathBuf {
        match self.manifest.app.crash_report_dir.as_deref() {
            Some(dir) => resolve(&self.app_dir, dir),
            None => self.app_dir.join("crashes"),
        }
    }
}

pub fn parse_manifest(text: &str) -> Result<Manifest> {
    let manifest: Manifest = toml::from_str(text).context("parsing manifest")?;
    anyhow::ensure!(!manifest.app.identifier.is_empty(), "app.identifier must not be empty");
    Ok(manifest)
}

fn resolve(base: &Path, dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
