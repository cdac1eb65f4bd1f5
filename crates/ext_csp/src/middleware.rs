//! HeaderMiddleware - injects the security policy into outbound responses
//!
//! The host calls [`HeaderMiddleware::on_headers_received`] for every response
//! it serves into the window. Developer-tooling resources pass through as-is.

use crate::{CspError, RuntimeMode, SecurityPolicy};
use http::header::CONTENT_SECURITY_POLICY;
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;

/// Scheme used by the webview's own developer tools
pub const DEVTOOLS_SCHEME: &str = "devtools";

/// Source of the policy applied to each response
pub trait PolicyProvider: Send + Sync {
    fn policy(&self) -> Result<SecurityPolicy, CspError>;
}

/// Builds the policy for a fixed runtime mode
#[derive(Debug, Clone, Copy)]
pub struct ModePolicy(pub RuntimeMode);

impl PolicyProvider for ModePolicy {
    fn policy(&self) -> Result<SecurityPolicy, CspError> {
        SecurityPolicy::build(self.0)
    }
}

/// What to do with an intercepted response
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderDecision {
    /// Deliver the response with these headers
    Forward(HeaderMap),
    /// Do not deliver the response
    Deny,
}

impl HeaderDecision {
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny)
    }
}

pub struct HeaderMiddleware {
    provider: Arc<dyn PolicyProvider>,
    bypass_schemes: Vec<String>,
}

impl HeaderMiddleware {
    pub fn new(provider: Arc<dyn PolicyProvider>) -> Self {
        Self {
            provider,
            bypass_schemes: vec![DEVTOOLS_SCHEME.to_string()],
        }
    }

    pub fn for_mode(mode: RuntimeMode) -> Self {
        Self::new(Arc::new(ModePolicy(mode)))
    }

    /// Exempt another scheme from policy injection
    pub fn with_bypass_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.bypass_schemes.push(scheme.into().to_ascii_lowercase());
        self
    }

    /// Whether `url` names an internal developer-tooling resource
    pub fn is_bypass(&self, url: &str) -> bool {
        match url::Url::parse(url) {
            Ok(parsed) => self.bypass_schemes.iter().any(|s| s == parsed.scheme()),
            Err(_) => false,
        }
    }

    /// Decide the headers for a response to `url`.
    ///
    /// Bypass-class responses keep their headers untouched. Every other
    /// response gets exactly one policy header added or overwritten, or is
    /// denied when the policy cannot be produced.
    pub fn on_headers_received(&self, url: &str, mut headers: HeaderMap) -> HeaderDecision {
        if self.is_bypass(url) {
            tracing::trace!(url = %url, "csp bypass");
            return HeaderDecision::Forward(headers);
        }

        match self.header_value() {
            Ok(value) => {
                headers.insert(CONTENT_SECURITY_POLICY, value);
                HeaderDecision::Forward(headers)
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Denying response without security policy");
                HeaderDecision::Deny
            }
        }
    }

    fn header_value(&self) -> Result<HeaderValue, CspError> {
        let policy = self.provider.policy()?;
        HeaderValue::from_str(&policy.header_value())
            .map_err(|e| CspError::invalid_header_value(e.to_string()))
    }
}
