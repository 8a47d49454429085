//! Error types for the landing smoke run

use thiserror::Error;

use crate::report::FailureReport;

#[derive(Error, Debug)]
pub enum SmokeError {
    #[error("Dev server failed to start: {0}")]
    ServerStartup(String),

    #[error("Timed out waiting for server at {url}")]
    ServerNotReady { url: String },

    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout {timeout_ms}ms exceeded waiting for {locator} ({state})")]
    LocatorTimeout {
        locator: String,
        state: String,
        timeout_ms: u64,
    },

    /// One or more landing checks failed; the report lists every failure.
    #[error("{0}")]
    ChecksFailed(FailureReport),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type SmokeResult<T> = Result<T, SmokeError>;
