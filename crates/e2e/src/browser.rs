//! Browser automation boundary
//!
//! The checks only talk to these traits. `cdp` provides the Chrome
//! implementation; tests provide scripted ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BrowserConfig;
use crate::error::SmokeResult;
use crate::locator::Locator;

/// Visible rendering area of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Starts a browser
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self, config: &BrowserConfig) -> SmokeResult<Self::Session>;
}

/// A running browser able to host isolated browsing contexts
#[async_trait]
pub trait BrowserSession: Send {
    type Page: PageDriver;

    /// Open a fresh browsing context sized to `viewport` and a page in it.
    /// Error listeners are attached before this returns.
    async fn open_page(&mut self, viewport: Viewport) -> SmokeResult<Self::Page>;

    /// Close the page and dispose of its browsing context
    async fn close_page(&mut self, page: Self::Page) -> SmokeResult<()>;

    /// Shut the browser down
    async fn close(self) -> SmokeResult<()>;
}

/// One page inside a browsing context
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and wait for network idle
    async fn goto(&mut self, url: &str) -> SmokeResult<()>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate(&mut self, expression: &str) -> SmokeResult<serde_json::Value>;

    /// Click the element `locator` resolves to, waiting for it to be actionable
    async fn click(&mut self, locator: &Locator) -> SmokeResult<()>;

    /// Move the mouse over the element `locator` resolves to
    async fn hover(&mut self, locator: &Locator) -> SmokeResult<()>;

    /// Current `window.location.href`
    async fn current_url(&mut self) -> SmokeResult<String>;

    /// Drain the page and console errors captured so far
    fn take_errors(&mut self) -> Vec<String>;
}
