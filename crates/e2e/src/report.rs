//! Failure collection and the final verdict

use std::fmt;

/// One violated expectation, tagged with the viewport width that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub width: u32,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}px] {}", self.width, self.message)
    }
}

/// Ordered, append-only list of failures for a whole run
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    failures: Vec<Failure>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed check for `width`
    pub fn record(&mut self, width: u32, message: impl Into<String>) {
        let failure = Failure {
            width,
            message: message.into(),
        };
        tracing::warn!("{}", failure);
        self.failures.push(failure);
    }

    /// Roll captured console/page errors into a single failure.
    /// Does nothing when `errors` is empty.
    pub fn record_console_errors(&mut self, width: u32, errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        self.record(width, format!("Console errors: {}", errors.join(" | ")));
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consume the log: `Ok` when nothing failed
    pub fn into_report(self) -> Result<(), FailureReport> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(FailureReport {
                failures: self.failures,
            })
        }
    }
}

/// Consolidated failure listing, one failure per line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    failures: Vec<Failure>,
}

impl FailureReport {
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landing smoke checks failed:")?;
        for failure in &self.failures {
            write!(f, "\n- {}", failure)?;
        }
        Ok(())
    }
}

/// Success line naming every width that was checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    widths: Vec<u32>,
}

impl PassSummary {
    pub fn widths(&self) -> &[u32] {
        &self.widths
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<String> = self.widths.iter().map(|w| w.to_string()).collect();
        write!(f, "Landing smoke checks passed for {}", widths.join("/"))
    }
}

/// Everything the viewport checks produced
#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub widths: Vec<u32>,
    pub failures: FailureLog,
}

impl SmokeReport {
    pub fn verdict(self) -> Result<PassSummary, FailureReport> {
        self.failures.into_report()?;
        Ok(PassSummary {
            widths: self.widths,
        })
    }
}
