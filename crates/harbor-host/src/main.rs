//! harbor - desktop host for a single-window web UI
//!
//! Owns the tao event loop. Everything with policy lives in the ext_* crates;
//! this binary wires them together and maps platform events onto the
//! lifecycle controller.

mod assets;
mod config;
mod crash;
mod runtime;

use anyhow::{Context, Result};
use clap::Parser;
use ext_clipboard::SystemClipboard;
use ext_csp::HeaderMiddleware;
use ext_ipc::SessionProvider;
use ext_storage::SqliteSessionStore;
use ext_window::{ControlDecision, LifecycleController, WindowManager, WindowManagerConfig};
use std::sync::Arc;
use tao::event::{Event, StartCause, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};
use tracing::{debug, info, warn};

use crate::assets::BundleAssets;
use crate::config::{Args, HostConfig};
use crate::crash::CrashReporter;
use crate::runtime::{build_runtime, forward_quit_signal, start_bridge, HostEvent};

fn main() -> Result<()> {
    init_tracing();
    run()
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("HARBOR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn open_session_store(identifier: &str) -> Result<Arc<dyn SessionProvider>> {
    match SqliteSessionStore::open_default(identifier) {
        Ok(store) => {
            if let Some(path) = store.db_path() {
                debug!(path = %path.display(), "Session store opened");
            }
            Ok(Arc::new(store))
        }
        Err(e) => {
            warn!(error = %e, "Session store unavailable, sessions will not persist");
            let store = SqliteSessionStore::open_in_memory()
                .context("opening in-memory session store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Sink for runtime tasks; `false` once the event loop has exited
fn proxy_sink(
    proxy: EventLoopProxy<HostEvent>,
) -> impl Fn(HostEvent) -> bool + Send + 'static {
    move |event| proxy.send_event(event).is_ok()
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = HostConfig::load(&args)?;
    let app = &config.manifest.app;
    info!(app = %app.name, version = %app.version, mode = %config.mode, "Starting harbor");

    if config.crash_reporting() {
        CrashReporter::new(config.crash_report_dir(), &app.name, &app.version, config.mode)
            .install();
    }

    let bundle_dir = config.bundle_dir();
    let assets = BundleAssets::new(&bundle_dir)
        .with_context(|| format!("opening UI bundle at {}", bundle_dir.display()))?;

    // Lives until the process exits: the event loop below never returns
    let rt = build_runtime()?;

    let session = open_session_store(&app.identifier)?;
    let event_loop: EventLoop<HostEvent> = EventLoopBuilder::with_user_event().build();
    let bridge = start_bridge(
        &rt,
        session,
        Arc::new(SystemClipboard),
        proxy_sink(event_loop.create_proxy()),
    );
    forward_quit_signal(
        &rt,
        tokio::signal::ctrl_c(),
        proxy_sink(event_loop.create_proxy()),
    );

    let middleware = Arc::new(HeaderMiddleware::for_mode(config.mode));
    let mut manager = WindowManager::new(
        WindowManagerConfig {
            app_name: app.name.clone(),
            mode: config.mode,
        },
        middleware,
        bridge,
        Arc::new(assets),
    );
    let mut lifecycle = LifecycleController::new(config.lifecycle_config());

    event_loop.run(move |event, target, control_flow| {
        *control_flow = ControlFlow::Wait;

        let decision = match event {
            Event::NewEvents(StartCause::Init) => {
                lifecycle.on_ready(&mut manager.backend(target))
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                window_id,
                ..
            } => match manager.handle_close_requested(window_id) {
                Some(handle) => lifecycle.on_window_closed(handle),
                None => ControlDecision::Continue,
            },
            Event::Reopen { .. } => lifecycle.on_activate(&mut manager.backend(target)),
            Event::UserEvent(HostEvent::Bridge(event)) => {
                manager.send_event(event);
                ControlDecision::Continue
            }
            Event::UserEvent(HostEvent::Quit) => lifecycle.on_quit(),
            _ => ControlDecision::Continue,
        };

        if decision == ControlDecision::Exit {
            info!("Exiting");
            *control_flow = ControlFlow::Exit;
        }
    })
}
