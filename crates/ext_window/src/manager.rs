//! WindowManager - Platform implementation for the application window
//!
//! harbor-host creates a WindowManager and hands it to the
//! [`LifecycleController`](crate::LifecycleController) through a
//! [`TaoBackend`] borrowed for the duration of one event.

use crate::{NavigationGuard, WindowBackend, WindowError, WindowHandle, WindowSpec};
use ext_csp::{HeaderDecision, HeaderMiddleware, RuntimeMode};
use ext_ipc::{dispatch_script, preload_script, BridgeEvent, PortBridge};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tao::event_loop::EventLoopWindowTarget;
use tao::window::{Window, WindowBuilder, WindowId};
use wry::http::header::CONTENT_TYPE;
use wry::http::{HeaderValue, Response, StatusCode};
use wry::WebView;

/// Custom protocol serving the UI bundle
pub const APP_SCHEME: &str = "app";

/// Asset provider trait - allows harbor-host to serve the bundle from anywhere
pub trait AssetProvider: Send + Sync {
    fn get_asset(&self, path: &str) -> Option<Vec<u8>>;
}

/// Configuration for WindowManager
pub struct WindowManagerConfig {
    pub app_name: String,
    pub mode: RuntimeMode,
}

/// WindowManager handles all platform window operations
pub struct WindowManager {
    window_counter: u64,
    windows: HashMap<WindowId, WindowHandle>,
    webviews: HashMap<WindowHandle, WebView>,
    tao_windows: HashMap<WindowHandle, Window>,

    config: WindowManagerConfig,
    middleware: Arc<HeaderMiddleware>,
    bridge: PortBridge,
    asset_provider: Arc<dyn AssetProvider>,
}

impl WindowManager {
    pub fn new(
        config: WindowManagerConfig,
        middleware: Arc<HeaderMiddleware>,
        bridge: PortBridge,
        asset_provider: Arc<dyn AssetProvider>,
    ) -> Self {
        Self {
            window_counter: 0,
            windows: HashMap::new(),
            webviews: HashMap::new(),
            tao_windows: HashMap::new(),
            config,
            middleware,
            bridge,
            asset_provider,
        }
    }

    /// Borrow the manager as a lifecycle backend for one event
    pub fn backend<'a, U: 'static>(
        &'a mut self,
        target: &'a EventLoopWindowTarget<U>,
    ) -> TaoBackend<'a, U> {
        TaoBackend {
            manager: self,
            target,
        }
    }

    /// Deliver a bridge event to every open window.
    /// Events arriving while no window exists are dropped.
    pub fn send_event(&self, event: BridgeEvent) {
        if self.webviews.is_empty() {
            tracing::debug!(?event, "No window to receive bridge event");
            return;
        }

        let js = match dispatch_script(event) {
            Ok(js) => js,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode bridge event");
                return;
            }
        };
        for (handle, webview) in &self.webviews {
            if let Err(e) = webview.evaluate_script(&js) {
                tracing::warn!(window = %handle, error = %e, "Failed to deliver bridge event");
            }
        }
    }

    // =========================================================================
    // Window Lifecycle
    // =========================================================================

    fn create_window<U: 'static>(
        &mut self,
        event_loop_target: &EventLoopWindowTarget<U>,
        spec: &WindowSpec,
    ) -> Result<WindowHandle, WindowError> {
        tracing::debug!(?spec, "create_window starting");

        let window = WindowBuilder::new()
            .with_title(&spec.title)
            .with_inner_size(tao::dpi::LogicalSize::new(spec.width, spec.height))
            .build(event_loop_target)
            .map_err(|e| WindowError::create_failed(e.to_string()))?;

        self.window_counter += 1;
        let handle = WindowHandle::new(self.window_counter);

        // Read the session now so a re-created window sees the latest value
        let init_script = preload_script(&self.bridge.init_payload())?;

        let mut wv_builder = wry::WebViewBuilder::new()
            .with_initialization_script(&init_script)
            .with_devtools(self.config.mode.is_development());

        // Header middleware is registered before the first URL is loaded
        let middleware = self.middleware.clone();
        let asset_provider = self.asset_provider.clone();
        wv_builder = wv_builder.with_custom_protocol(APP_SCHEME.into(), move |_ctx, request| {
            let uri = request.uri().to_string();
            protocol_response(&uri, asset_provider.as_ref(), &middleware)
        });

        // IPC handler: renderer -> port bridge
        let bridge = self.bridge.clone();
        wv_builder = wv_builder.with_ipc_handler(move |msg| {
            if let Err(e) = bridge.handle_message(msg.body()) {
                tracing::warn!(window = %handle, error = %e, "Rejected bridge message");
            }
        });

        let guard = navigation_guard(&spec.start_url);
        wv_builder = wv_builder
            .with_navigation_handler(move |url| guard.allows(&url))
            .with_new_window_req_handler(|url| {
                tracing::debug!(url = %url, "New window request denied");
                false
            })
            .with_url(&spec.start_url);

        let webview = wv_builder
            .build(&window)
            .map_err(|e| WindowError::create_failed(format!("Failed to build webview: {}", e)))?;

        self.windows.insert(window.id(), handle);
        self.webviews.insert(handle, webview);
        self.tao_windows.insert(handle, window);

        tracing::info!(
            app = %self.config.app_name,
            window = %handle,
            url = %spec.start_url,
            "Created window"
        );
        Ok(handle)
    }

    /// Open developer tools for a window
    pub fn open_devtools(&self, handle: WindowHandle) -> Result<(), WindowError> {
        let webview = self
            .webviews
            .get(&handle)
            .ok_or_else(|| WindowError::window_not_found(handle.to_string()))?;

        #[cfg(any(debug_assertions, feature = "devtools"))]
        {
            webview.open_devtools();
            Ok(())
        }
        #[cfg(not(any(debug_assertions, feature = "devtools")))]
        {
            let _ = webview;
            Err(WindowError::devtools_unavailable(
                "build without the devtools feature",
            ))
        }
    }

    // =========================================================================
    // Window Events (called from event loop)
    // =========================================================================

    /// Handle window close requested event.
    /// Returns the handle of the destroyed window, if it was ours.
    pub fn handle_close_requested(&mut self, tao_window_id: WindowId) -> Option<WindowHandle> {
        let handle = self.windows.remove(&tao_window_id)?;
        // Webview first, then the window hosting it
        self.webviews.remove(&handle);
        self.tao_windows.remove(&handle);
        tracing::debug!(window = %handle, "Window destroyed");
        Some(handle)
    }
}

/// [`WindowBackend`] over a [`WindowManager`] and the current event loop target
pub struct TaoBackend<'a, U: 'static> {
    manager: &'a mut WindowManager,
    target: &'a EventLoopWindowTarget<U>,
}

impl<U: 'static> WindowBackend for TaoBackend<'_, U> {
    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError> {
        self.manager.create_window(self.target, spec)
    }

    fn open_devtools(&mut self, window: WindowHandle) -> Result<(), WindowError> {
        self.manager.open_devtools(window)
    }
}

fn navigation_guard(start_url: &str) -> NavigationGuard {
    let guard = NavigationGuard::new(start_url);
    // WebView2 serves custom protocols as http://<scheme>.<host>
    #[cfg(target_os = "windows")]
    let guard = match start_url.strip_prefix("app://") {
        Some(rest) => guard.with_allowed(&format!("http://app.{}", rest)),
        None => guard,
    };
    guard
}

// ============================================================================
// app:// protocol
// ============================================================================

/// Bundle-relative path for an `app://` URI, or `None` if it escapes the bundle
pub fn asset_path(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("app://").unwrap_or(uri);
    let rest = rest.split(['?', '#']).next().unwrap_or("");
    let mut path = rest.trim_start_matches('/').trim_end_matches('/');

    // Relative resources resolve against the document URL: "index.html/main.js"
    if let Some(slash_pos) = path.find('/') {
        let first_part = &path[..slash_pos];
        if first_part.ends_with(".html") || first_part.ends_with(".htm") {
            path = &path[slash_pos + 1..];
        }
    }

    if path.is_empty() {
        return Some("index.html".to_string());
    }
    if path
        .split('/')
        .any(|segment| segment == ".." || segment.contains('\\'))
    {
        return None;
    }
    Some(path.to_string())
}

pub fn mime_for(path: &str) -> &'static str {
    if let Some(ext) = std::path::Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
    {
        match ext {
            "html" | "htm" => "text/html; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "json" => "application/json",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "txt" => "text/plain; charset=utf-8",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
    } else {
        "application/octet-stream"
    }
}

/// Serve `uri` from the bundle and run the result through the header middleware.
/// A denied response becomes an empty 403.
pub fn protocol_response(
    uri: &str,
    assets: &dyn AssetProvider,
    middleware: &HeaderMiddleware,
) -> Response<Cow<'static, [u8]>> {
    let mut response = match asset_path(uri) {
        Some(path) => match assets.get_asset(&path) {
            Some(bytes) => plain_response(StatusCode::OK, mime_for(&path), bytes),
            None => {
                tracing::debug!(uri = %uri, path = %path, "Asset not found");
                plain_response(
                    StatusCode::NOT_FOUND,
                    "text/plain; charset=utf-8",
                    format!("Not found: {}", path).into_bytes(),
                )
            }
        },
        None => {
            tracing::warn!(uri = %uri, "Rejected asset path outside the bundle");
            plain_response(
                StatusCode::FORBIDDEN,
                "text/plain; charset=utf-8",
                b"Forbidden".to_vec(),
            )
        }
    };

    let headers = std::mem::take(response.headers_mut());
    match middleware.on_headers_received(uri, headers) {
        HeaderDecision::Forward(headers) => {
            *response.headers_mut() = headers;
            response
        }
        HeaderDecision::Deny => {
            let mut denied = Response::new(Cow::Owned(Vec::new()));
            *denied.status_mut() = StatusCode::FORBIDDEN;
            denied
        }
    }
}

fn plain_response(
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response<Cow<'static, [u8]>> {
    let mut response = Response::new(Cow::Owned(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use ext_csp::{CspError, PolicyProvider, SecurityPolicy};
    use wry::http::header::CONTENT_SECURITY_POLICY;

    struct FakeAssets;

    impl AssetProvider for FakeAssets {
        fn get_asset(&self, path: &str) -> Option<Vec<u8>> {
            match path {
                "index.html" => Some(b"<html></html>".to_vec()),
                "main.js" => Some(b"console.log(1)".to_vec()),
                _ => None,
            }
        }
    }

    struct BrokenPolicy;

    impl PolicyProvider for BrokenPolicy {
        fn policy(&self) -> Result<SecurityPolicy, CspError> {
            Err(CspError::unavailable("broken"))
        }
    }

    #[test]
    fn test_asset_path() {
        assert_eq!(asset_path("app://index.html").as_deref(), Some("index.html"));
        assert_eq!(asset_path("app://index.html/").as_deref(), Some("index.html"));
        assert_eq!(asset_path("app://index.html/main.js").as_deref(), Some("main.js"));
        assert_eq!(asset_path("app://fonts/a.woff2?v=3").as_deref(), Some("fonts/a.woff2"));
        assert_eq!(asset_path("app://").as_deref(), Some("index.html"));
        assert_eq!(asset_path("app://../secret"), None);
        assert_eq!(asset_path("app://index.html/../../etc/passwd"), None);
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(mime_for("styles.css"), "text/css; charset=utf-8");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_served_asset_carries_policy() {
        let mw = HeaderMiddleware::for_mode(RuntimeMode::Production);
        let response = protocol_response("app://index.html/main.js", &FakeAssets, &mw);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/javascript; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(CONTENT_SECURITY_POLICY).unwrap(),
            SecurityPolicy::build(RuntimeMode::Production)
                .unwrap()
                .header_value()
                .as_str()
        );
        assert_eq!(response.body().as_ref(), b"console.log(1)");
    }

    #[test]
    fn test_missing_asset_still_gets_policy() {
        let mw = HeaderMiddleware::for_mode(RuntimeMode::Development);
        let response = protocol_response("app://missing.png", &FakeAssets, &mw);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(CONTENT_SECURITY_POLICY));
    }

    #[test]
    fn test_policy_failure_denies_response() {
        let mw = HeaderMiddleware::new(Arc::new(BrokenPolicy));
        let response = protocol_response("app://index.html", &FakeAssets, &mw);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.body().is_empty());
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_traversal_forbidden() {
        let mw = HeaderMiddleware::for_mode(RuntimeMode::Production);
        let response = protocol_response("app://../Cargo.toml", &FakeAssets, &mw);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
