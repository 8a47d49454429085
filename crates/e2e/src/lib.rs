//! Landing page smoke test
//!
//! Starts the web project's dev server, drives headless Chrome across a
//! fixed set of viewport widths and checks that the landing page:
//! - has no horizontal overflow
//! - routes its "Start Building" and "View Traces" CTAs correctly
//! - reaches `#districts` through the responsive navigation
//! - emits no page or console errors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     runner::run(config)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DevServer::spawn()          npm --prefix web run dev ...   │
//! │  wait_until_ready()          GET http://127.0.0.1:4173      │
//! │  BrowserLauncher::launch()   chromiumoxide (cdp)            │
//! │  checks::run_all()                                          │
//! │    └── per viewport: open_page → check_viewport → close     │
//! │  SmokeReport::verdict()      PassSummary | FailureReport    │
//! │  DevServer::shutdown()       SIGTERM, grace, SIGKILL        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod cdp;
pub mod checks;
pub mod config;
pub mod error;
pub mod locator;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod server;

pub use cdp::ChromeLauncher;
pub use config::SmokeConfig;
pub use error::{SmokeError, SmokeResult};
pub use report::{FailureReport, PassSummary};
pub use runner::run;
