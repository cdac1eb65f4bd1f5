use std::fmt;

pub mod lifecycle;
pub use lifecycle::*;

// Manager module with platform implementation
pub mod manager;
pub use manager::*;

// ============================================================================
// Error Types (6000+ range)
// ============================================================================

/// Error codes for window operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WindowErrorCode {
    /// Generic window error
    Generic = 6000,
    /// Window not found
    WindowNotFound = 6002,
    /// Failed to create window
    CreateFailed = 6003,
    /// Developer tools unavailable in this build
    DevtoolsUnavailable = 6015,
}

/// Custom error type for window operations
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("[{code}] {message}")]
    Generic { code: u32, message: String },

    #[error("[{code}] Window not found: {window_id}")]
    WindowNotFound { code: u32, window_id: String },

    #[error("[{code}] Failed to create window: {message}")]
    CreateFailed { code: u32, message: String },

    #[error("[{code}] DevTools unavailable: {message}")]
    DevtoolsUnavailable { code: u32, message: String },
}

impl WindowError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            code: WindowErrorCode::Generic as u32,
            message: message.into(),
        }
    }

    pub fn window_not_found(window_id: impl Into<String>) -> Self {
        Self::WindowNotFound {
            code: WindowErrorCode::WindowNotFound as u32,
            window_id: window_id.into(),
        }
    }

    pub fn create_failed(message: impl Into<String>) -> Self {
        Self::CreateFailed {
            code: WindowErrorCode::CreateFailed as u32,
            message: message.into(),
        }
    }

    pub fn devtools_unavailable(message: impl Into<String>) -> Self {
        Self::DevtoolsUnavailable {
            code: WindowErrorCode::DevtoolsUnavailable as u32,
            message: message.into(),
        }
    }
}

impl From<ext_ipc::IpcError> for WindowError {
    fn from(e: ext_ipc::IpcError) -> Self {
        Self::create_failed(e.to_string())
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Identifies one native window for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(u64);

impl WindowHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "win-{}", self.0)
    }
}

/// What the host builds for every application window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub start_url: String,
}

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;
pub const DEFAULT_START_URL: &str = "app://index.html";

impl WindowSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            start_url: DEFAULT_START_URL.to_string(),
        }
    }
}

// ============================================================================
// Navigation Guard
// ============================================================================

/// Rejects every top-level navigation away from the window's start URL
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    allowed: Vec<String>,
}

impl NavigationGuard {
    pub fn new(start_url: &str) -> Self {
        Self {
            allowed: vec![normalize_url(start_url).to_string()],
        }
    }

    /// Also accept `url`, e.g. the platform's rewritten form of the start URL
    pub fn with_allowed(mut self, url: &str) -> Self {
        self.allowed.push(normalize_url(url).to_string());
        self
    }

    pub fn allows(&self, url: &str) -> bool {
        let target = normalize_url(url);
        let allowed = self.allowed.iter().any(|a| a == target);
        if !allowed {
            tracing::debug!(url = %url, "Navigation cancelled");
        }
        allowed
    }
}

fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

// ============================================================================
// Tests
// ============================================================================
