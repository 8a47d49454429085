//! Smoke run configuration
//!
//! Defaults reproduce the fixed suite: dev server on port 4173, widths
//! 375/768/1024/1440 at height 900, 20 second readiness window.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::Viewport;
use crate::error::SmokeResult;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Dev server process
    pub server: ServerConfig,

    /// Readiness polling
    pub readiness: ReadinessConfig,

    /// Headless browser
    pub browser: BrowserConfig,

    /// Viewports and expectations
    pub checks: CheckConfig,
}

impl SmokeConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> SmokeResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// URL the poller and the browser talk to
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server.connect_host, self.server.port)
    }

    /// Viewports in the order they are checked
    pub fn viewports(&self) -> Vec<Viewport> {
        self.checks
            .widths
            .iter()
            .map(|&width| Viewport::new(width, self.checks.height))
            .collect()
    }
}

/// How the dev server is launched and stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Package-script runner
    pub program: String,

    /// Arguments; `{host}` and `{port}` are substituted
    pub args: Vec<String>,

    /// Working directory for the child (None = current directory)
    pub working_dir: Option<PathBuf>,

    /// Host the dev server binds to
    pub bind_host: String,

    /// Host used to reach the dev server
    pub connect_host: String,

    /// Port the dev server listens on
    pub port: u16,

    /// How long SIGTERM is given before the child is killed
    pub shutdown_grace_ms: u64,

    /// Number of recent output lines kept for diagnostics
    pub output_lines: usize,
}

impl ServerConfig {
    /// Arguments with placeholders resolved
    pub fn resolved_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{host}", &self.bind_host).replace("{port}", &port))
            .collect()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            args: [
                "--prefix", "web", "run", "dev", "--", "--host", "{host}", "--port", "{port}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            working_dir: None,
            bind_host: "0.0.0.0".to_string(),
            connect_host: "127.0.0.1".to_string(),
            port: 4173,
            shutdown_grace_ms: 5_000,
            output_lines: 200,
        }
    }
}

/// Readiness polling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Overall window for the server to answer 200
    pub timeout_ms: u64,

    /// Pause between attempts
    pub poll_interval_ms: u64,

    /// Timeout of a single GET
    pub request_timeout_ms: u64,
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            poll_interval_ms: 300,
            request_timeout_ms: 1_500,
        }
    }
}

/// Browser launch and per-action limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a window
    pub headless: bool,

    /// Chrome/Chromium binary (None = auto-detect)
    pub executable: Option<PathBuf>,

    /// Keep the Chrome sandbox enabled
    pub sandbox: bool,

    /// How long click/hover wait for their element
    pub action_timeout_ms: u64,

    /// Upper bound on a navigation including network idle
    pub navigation_timeout_ms: u64,

    /// Quiet period that counts as network idle
    pub network_idle_ms: u64,
}

impl BrowserConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            sandbox: true,
            action_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
            network_idle_ms: 500,
        }
    }
}

/// Viewport list and expectation timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Widths checked, in order
    pub widths: Vec<u32>,

    /// Height shared by every viewport
    pub height: u32,

    /// Widths at or above this use the desktop navigation
    pub desktop_breakpoint: u32,

    /// How long a post-click URL has to settle
    pub settle_timeout_ms: u64,

    /// URL polling interval while settling
    pub settle_poll_ms: u64,
}

impl CheckConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            widths: vec![375, 768, 1024, 1440],
            height: 900,
            desktop_breakpoint: 1024,
            settle_timeout_ms: 2_000,
            settle_poll_ms: 25,
        }
    }
}
