//! Browser port.
//!
//! The subsystem runs inside a storefront whose host environment owns
//! navigation, popups and the user agent string. That surface is modeled
//! as a trait so the orchestration code can force navigation on auth
//! failure and open gateway redirects without knowing the host.

use async_trait::async_trait;
use tracing::info;

use crate::errors::ServiceError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserPort: Send + Sync {
    /// User agent string of the active browsing context.
    fn user_agent(&self) -> String;

    /// Route currently displayed by the storefront.
    fn current_route(&self) -> String;

    /// Opens a URL in a new browsing context (link-payment redirect).
    async fn open_in_new_context(&self, url: &str) -> Result<(), ServiceError>;

    /// Hard-navigates the current context to a storefront route.
    async fn navigate(&self, route: &str);
}

/// Host-less implementation used by embedders without a browser surface
/// (background workers, smoke tooling). Navigations are logged and dropped.
#[derive(Debug, Default)]
pub struct NoopBrowser;

#[async_trait]
impl BrowserPort for NoopBrowser {
    fn user_agent(&self) -> String {
        String::new()
    }

    fn current_route(&self) -> String {
        "/".to_string()
    }

    async fn open_in_new_context(&self, url: &str) -> Result<(), ServiceError> {
        info!(url = %url, "no browser attached; dropping open request");
        Ok(())
    }

    async fn navigate(&self, route: &str) {
        info!(route = %route, "no browser attached; dropping navigation");
    }
}

/// Detects the Safari family (Safari, iOS WebKit views) from a user agent.
///
/// Chrome, Chromium, Edge, Opera and Android browsers embed "Safari" in
/// their user agents, so their own markers must be excluded.
pub fn is_safari_family(user_agent: &str) -> bool {
    let ua = user_agent;
    if !ua.contains("Safari") {
        return false;
    }
    const NOT_SAFARI: [&str; 6] = ["Chrome", "Chromium", "CriOS", "Edg", "OPR", "Android"];
    !NOT_SAFARI.iter().any(|marker| ua.contains(marker))
}
