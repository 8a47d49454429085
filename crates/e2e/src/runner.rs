//! Orchestrates dev server, readiness, browser checks and the verdict

use tracing::{info, warn};

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::checks;
use crate::config::SmokeConfig;
use crate::error::{SmokeError, SmokeResult};
use crate::readiness::wait_until_ready;
use crate::report::PassSummary;
use crate::server::DevServer;

/// Run the whole smoke suite.
///
/// The dev server is shut down on every path out of this function,
/// including readiness timeouts and automation errors.
pub async fn run<L: BrowserLauncher>(config: &SmokeConfig, launcher: &L) -> SmokeResult<PassSummary> {
    let mut server = DevServer::spawn(&config.server)?;

    let outcome = drive(config, launcher).await;

    if matches!(outcome, Err(SmokeError::ServerNotReady { .. })) {
        let lines = server.output().lines();
        if lines.is_empty() {
            warn!("Dev server produced no output");
        } else {
            warn!("Last dev server output:\n{}", lines.join("\n"));
        }
    }

    if let Err(e) = server.shutdown(config.server.shutdown_grace()).await {
        warn!("Dev server shutdown failed: {}", e);
    }

    outcome
}

async fn drive<L: BrowserLauncher>(config: &SmokeConfig, launcher: &L) -> SmokeResult<PassSummary> {
    let base_url = config.base_url();
    wait_until_ready(&base_url, &config.readiness).await?;

    let mut session = launcher.launch(&config.browser).await?;
    let checked = checks::run_all(&mut session, config).await;
    let closed = session.close().await;

    let report = match (checked, closed) {
        (Ok(report), closed) => {
            closed?;
            report
        }
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!("Browser close failed after error: {}", close_err);
            }
            return Err(e);
        }
    };

    let failed = report.failures.len();
    match report.verdict() {
        Ok(summary) => {
            info!("All {} viewport(s) passed", summary.widths().len());
            Ok(summary)
        }
        Err(report) => {
            info!("{} check(s) failed", failed);
            Err(SmokeError::ChecksFailed(report))
        }
    }
}
