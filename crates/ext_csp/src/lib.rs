//! Content-Security-Policy construction for the Harbor host window
//!
//! The policy is a pure function of the [`RuntimeMode`]. The
//! [`HeaderMiddleware`] applies it to every response served into the window.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod middleware;
pub use middleware::*;

// ============================================================================
// Error Types (9100+ range)
// ============================================================================

/// Error codes for policy operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CspErrorCode {
    /// Two directives share a name
    DuplicateDirective = 9100,
    /// A production policy carries a development-only relaxation
    RelaxedInProduction = 9101,
    /// The joined policy cannot be encoded as a header value
    InvalidHeaderValue = 9102,
    /// Policy could not be produced
    Unavailable = 9103,
}

/// Custom error type for policy operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CspError {
    #[error("[{code}] Duplicate directive: {name}")]
    DuplicateDirective { code: u32, name: String },

    #[error("[{code}] Production policy relaxes {name}")]
    RelaxedInProduction { code: u32, name: String },

    #[error("[{code}] Invalid header value: {message}")]
    InvalidHeaderValue { code: u32, message: String },

    #[error("[{code}] Policy unavailable: {message}")]
    Unavailable { code: u32, message: String },
}

impl CspError {
    pub fn duplicate_directive(name: impl Into<String>) -> Self {
        Self::DuplicateDirective {
            code: CspErrorCode::DuplicateDirective as u32,
            name: name.into(),
        }
    }

    pub fn relaxed_in_production(name: impl Into<String>) -> Self {
        Self::RelaxedInProduction {
            code: CspErrorCode::RelaxedInProduction as u32,
            name: name.into(),
        }
    }

    pub fn invalid_header_value(message: impl Into<String>) -> Self {
        Self::InvalidHeaderValue {
            code: CspErrorCode::InvalidHeaderValue as u32,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            code: CspErrorCode::Unavailable as u32,
            message: message.into(),
        }
    }
}

// ============================================================================
// Runtime Mode
// ============================================================================

/// Whether the host runs against the hot-reload tooling or a release bundle.
/// Chosen once at startup and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Development,
    Production,
}

impl RuntimeMode {
    pub fn from_dev_flag(dev: bool) -> Self {
        if dev {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

// ============================================================================
// Directives
// ============================================================================

pub const DEFAULT_SRC: &str = "default-src";
pub const SCRIPT_SRC_ELEM: &str = "script-src-elem";
pub const FONT_SRC: &str = "font-src";
pub const STYLE_SRC_ELEM: &str = "style-src-elem";
pub const CONNECT_SRC: &str = "connect-src";
pub const SCRIPT_SRC: &str = "script-src";

/// Source expression that lets scripts call `eval` and friends
pub const UNSAFE_EVAL: &str = "'unsafe-eval'";

/// A single `<name> <source>...` policy directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: &'static str,
    sources: Vec<&'static str>,
}

impl Directive {
    pub fn new(name: &'static str, sources: &[&'static str]) -> Self {
        Self {
            name,
            sources: sources.to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn sources(&self) -> &[&'static str] {
        &self.sources
    }

    fn relaxes_script_execution(&self) -> bool {
        self.sources.contains(&UNSAFE_EVAL)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for source in &self.sources {
            write!(f, " {}", source)?;
        }
        Ok(())
    }
}

// ============================================================================
// Security Policy
// ============================================================================

/// Ordered set of directives, unique by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPolicy {
    directives: Vec<Directive>,
}

impl SecurityPolicy {
    /// Build the policy for `mode`.
    ///
    /// Every mode denies by default, allows scripts and fonts from the app
    /// origin, inline styles, and outbound connections anywhere. Development
    /// additionally allows runtime-evaluated scripts for the hot-reload client.
    pub fn build(mode: RuntimeMode) -> Result<Self, CspError> {
        let mut policy = Self::default();
        policy.push(Directive::new(DEFAULT_SRC, &["'none'"]))?;
        policy.push(Directive::new(SCRIPT_SRC_ELEM, &["'self'"]))?;
        policy.push(Directive::new(FONT_SRC, &["'self'"]))?;
        policy.push(Directive::new(STYLE_SRC_ELEM, &["'unsafe-inline'"]))?;
        policy.push(Directive::new(CONNECT_SRC, &["*"]))?;

        if mode.is_development() {
            policy.push(Directive::new(SCRIPT_SRC, &[UNSAFE_EVAL]))?;
        }

        policy.validate(mode)?;
        Ok(policy)
    }

    /// Append a directive, rejecting a name that is already present
    pub fn push(&mut self, directive: Directive) -> Result<(), CspError> {
        if self.get(directive.name()).is_some() {
            return Err(CspError::duplicate_directive(directive.name()));
        }
        self.directives.push(directive);
        Ok(())
    }

    /// Check that a production policy never relaxes script execution
    pub fn validate(&self, mode: RuntimeMode) -> Result<(), CspError> {
        if mode.is_development() {
            return Ok(());
        }
        match self.directives.iter().find(|d| d.relaxes_script_execution()) {
            Some(d) => Err(CspError::relaxed_in_production(d.name())),
            None => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name() == name)
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Directives joined with `;`, in insertion order
    pub fn header_value(&self) -> String {
        self.directives
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

// ============================================================================
// Tests
// ============================================================================
