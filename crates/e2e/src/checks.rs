//! Landing page checks, run once per viewport
//!
//! Assertion mismatches go into the [`FailureLog`] and the remaining checks
//! keep running. Automation errors (element never appears, navigation
//! fails) are returned and abort the run.

use std::time::Instant;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::{BrowserSession, PageDriver, Viewport};
use crate::config::{CheckConfig, SmokeConfig};
use crate::error::SmokeResult;
use crate::locator::Locator;
use crate::report::{FailureLog, SmokeReport};

/// Anchor the navigation menu must reach
pub const NAV_ANCHOR: &str = "#districts";

const OVERFLOW_SCRIPT: &str = r#"(() => ({
  scrollWidth: document.documentElement.scrollWidth,
  innerWidth: window.innerWidth
}))()"#;

/// A call-to-action link and the route it must lead to
#[derive(Debug, Clone, Copy)]
pub struct CtaCheck {
    pub label: &'static str,
    pub route: &'static str,
}

pub const PRIMARY_CTA: CtaCheck = CtaCheck {
    label: "Start Building",
    route: "/dashboard",
};

pub const SECONDARY_CTA: CtaCheck = CtaCheck {
    label: "View Traces",
    route: "/traces",
};

/// Document width against viewport width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverflowProbe {
    pub scroll_width: u32,
    pub inner_width: u32,
}

impl OverflowProbe {
    /// More than one pixel of horizontal overflow
    pub fn has_overflow(&self) -> bool {
        self.scroll_width > self.inner_width + 1
    }
}

/// Which navigation pattern the page shows at a width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavLayout {
    /// Menu behind a toggle button
    Collapsed,
    /// Dropdown revealed by hovering "Discover"
    Hover,
}

impl NavLayout {
    pub fn for_width(width: u32, breakpoint: u32) -> Self {
        if width < breakpoint {
            Self::Collapsed
        } else {
            Self::Hover
        }
    }
}

/// Last URL seen while waiting for an expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub url: String,
    pub matched: bool,
}

/// Poll the page URL until `expect` holds or the settle timeout expires
pub async fn settle_url<P, F>(page: &mut P, checks: &CheckConfig, expect: F) -> SmokeResult<Settled>
where
    P: PageDriver + ?Sized,
    F: Fn(&str) -> bool + Send,
{
    let start = Instant::now();
    loop {
        let url = page.current_url().await?;
        if expect(&url) {
            return Ok(Settled { url, matched: true });
        }
        if start.elapsed() >= checks.settle_timeout() {
            return Ok(Settled { url, matched: false });
        }
        sleep(checks.settle_poll()).await;
    }
}

/// Run every check for one viewport on an already open page
pub async fn check_viewport<P>(
    page: &mut P,
    config: &SmokeConfig,
    viewport: Viewport,
    failures: &mut FailureLog,
) -> SmokeResult<()>
where
    P: PageDriver + ?Sized,
{
    let width = viewport.width;
    let base_url = config.base_url();

    page.goto(&base_url).await?;

    let probe: OverflowProbe = serde_json::from_value(page.evaluate(OVERFLOW_SCRIPT).await?)?;
    debug!("[{}px] scrollWidth={} innerWidth={}", width, probe.scroll_width, probe.inner_width);
    if probe.has_overflow() {
        failures.record(
            width,
            format!(
                "Horizontal overflow: {} > {}",
                probe.scroll_width, probe.inner_width
            ),
        );
    }

    for (i, cta) in [PRIMARY_CTA, SECONDARY_CTA].into_iter().enumerate() {
        if i > 0 {
            page.goto(&base_url).await?;
        }
        page.click(&Locator::link_text(cta.label)).await?;
        let settled = settle_url(page, &config.checks, |url| url.contains(cta.route)).await?;
        if !settled.matched {
            failures.record(width, format!("{} CTA bad URL: {}", cta.label, settled.url));
        }
    }

    page.goto(&base_url).await?;
    match NavLayout::for_width(width, config.checks.desktop_breakpoint) {
        NavLayout::Collapsed => {
            page.click(&Locator::visible("nav button")).await?;
        }
        NavLayout::Hover => {
            page.hover(&Locator::button_text("Discover")).await?;
        }
    }
    page.click(&Locator::href(NAV_ANCHOR)).await?;
    let settled = settle_url(page, &config.checks, |url| url.ends_with(NAV_ANCHOR)).await?;
    if !settled.matched {
        failures.record(
            width,
            format!(
                "Nav anchor did not navigate to {}: {}",
                NAV_ANCHOR, settled.url
            ),
        );
    }

    failures.record_console_errors(width, &page.take_errors());
    Ok(())
}

/// Check every configured viewport in order, each in a fresh context
pub async fn run_all<S: BrowserSession>(
    session: &mut S,
    config: &SmokeConfig,
) -> SmokeResult<SmokeReport> {
    let mut failures = FailureLog::new();

    for viewport in config.viewports() {
        info!("Checking {}x{}", viewport.width, viewport.height);
        let before = failures.len();

        let mut page = session.open_page(viewport).await?;
        let checked = check_viewport(&mut page, config, viewport, &mut failures).await;
        let closed = session.close_page(page).await;
        checked?;
        closed?;

        let found = failures.len() - before;
        if found == 0 {
            info!("✓ {}px", viewport.width);
        } else {
            info!("✗ {}px ({} failure(s))", viewport.width, found);
        }
    }

    Ok(SmokeReport {
        widths: config.checks.widths.clone(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SmokeError;
    use async_trait::async_trait;
    use serde_json::json;

    /// Landing page stand-in: follows CTAs and the nav menu like the real page
    #[derive(Debug, Default)]
    struct FakeLanding {
        base: String,
        url: String,
        scroll_width: Option<u32>,
        width: u32,
        menu_open: bool,
        dropdown_open: bool,
        broken_routes: Vec<&'static str>,
        no_desktop_anchor: bool,
        errors: Vec<String>,
        actions: Vec<String>,
    }

    impl FakeLanding {
        fn at(width: u32) -> Self {
            Self {
                base: SmokeConfig::default().base_url(),
                width,
                ..Default::default()
            }
        }

        fn not_found(locator: &Locator) -> SmokeError {
            SmokeError::LocatorTimeout {
                locator: locator.to_string(),
                state: "missing".to_string(),
                timeout_ms: 30_000,
            }
        }
    }

    #[async_trait]
    impl PageDriver for FakeLanding {
        async fn goto(&mut self, url: &str) -> SmokeResult<()> {
            self.actions.push(format!("goto {}", url));
            self.url = url.to_string();
            self.menu_open = false;
            self.dropdown_open = false;
            Ok(())
        }

        async fn evaluate(&mut self, _expression: &str) -> SmokeResult<serde_json::Value> {
            Ok(json!({
                "scrollWidth": self.scroll_width.unwrap_or(self.width),
                "innerWidth": self.width,
            }))
        }

        async fn click(&mut self, locator: &Locator) -> SmokeResult<()> {
            self.actions.push(format!("click {}", locator));
            if *locator == Locator::link_text("Start Building") {
                if !self.broken_routes.contains(&"/dashboard") {
                    self.url = format!("{}/dashboard", self.base);
                }
            } else if *locator == Locator::link_text("View Traces") {
                if !self.broken_routes.contains(&"/traces") {
                    self.url = format!("{}/traces", self.base);
                }
            } else if *locator == Locator::visible("nav button") {
                if self.width >= 1024 {
                    return Err(Self::not_found(locator));
                }
                self.menu_open = true;
            } else if *locator == Locator::href(NAV_ANCHOR) {
                let reachable = self.menu_open || (self.dropdown_open && !self.no_desktop_anchor);
                if !reachable {
                    return Err(Self::not_found(locator));
                }
                self.url = format!("{}/{}", self.base, NAV_ANCHOR);
            } else {
                return Err(Self::not_found(locator));
            }
            Ok(())
        }

        async fn hover(&mut self, locator: &Locator) -> SmokeResult<()> {
            self.actions.push(format!("hover {}", locator));
            if *locator == Locator::button_text("Discover") && self.width >= 1024 {
                self.dropdown_open = true;
                Ok(())
            } else {
                Err(Self::not_found(locator))
            }
        }

        async fn current_url(&mut self) -> SmokeResult<String> {
            Ok(self.url.clone())
        }

        fn take_errors(&mut self) -> Vec<String> {
            std::mem::take(&mut self.errors)
        }
    }

    /// Session handing out one fake page per viewport
    struct FakeSession {
        configure: fn(&mut FakeLanding),
        opened: Vec<u32>,
        closed: usize,
    }

    impl FakeSession {
        fn new(configure: fn(&mut FakeLanding)) -> Self {
            Self {
                configure,
                opened: Vec::new(),
                closed: 0,
            }
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        type Page = FakeLanding;

        async fn open_page(&mut self, viewport: Viewport) -> SmokeResult<FakeLanding> {
            self.opened.push(viewport.width);
            let mut page = FakeLanding::at(viewport.width);
            (self.configure)(&mut page);
            Ok(page)
        }

        async fn close_page(&mut self, _page: FakeLanding) -> SmokeResult<()> {
            self.closed += 1;
            Ok(())
        }

        async fn close(self) -> SmokeResult<()> {
            Ok(())
        }
    }

    fn fast_config() -> SmokeConfig {
        let mut config = SmokeConfig::default();
        config.checks.settle_timeout_ms = 30;
        config.checks.settle_poll_ms = 5;
        config
    }

    #[test]
    fn test_overflow_tolerates_one_pixel() {
        assert!(!OverflowProbe { scroll_width: 376, inner_width: 375 }.has_overflow());
        assert!(OverflowProbe { scroll_width: 377, inner_width: 375 }.has_overflow());
    }

    #[test]
    fn test_nav_layout_breakpoint() {
        assert_eq!(NavLayout::for_width(375, 1024), NavLayout::Collapsed);
        assert_eq!(NavLayout::for_width(1023, 1024), NavLayout::Collapsed);
        assert_eq!(NavLayout::for_width(1024, 1024), NavLayout::Hover);
        assert_eq!(NavLayout::for_width(1440, 1024), NavLayout::Hover);
    }

    #[tokio::test]
    async fn test_mobile_viewport_passes() {
        let config = fast_config();
        let mut page = FakeLanding::at(375);
        let mut failures = FailureLog::new();

        check_viewport(&mut page, &config, Viewport::new(375, 900), &mut failures)
            .await
            .unwrap();

        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(
            page.actions,
            vec![
                "goto http://127.0.0.1:4173",
                "click a:has-text(\"Start Building\")",
                "goto http://127.0.0.1:4173",
                "click a:has-text(\"View Traces\")",
                "goto http://127.0.0.1:4173",
                "click nav button:visible",
                "click a[href=\"#districts\"]",
            ]
        );
    }

    #[tokio::test]
    async fn test_desktop_viewport_hovers_discover() {
        let config = fast_config();
        let mut page = FakeLanding::at(1440);
        let mut failures = FailureLog::new();

        check_viewport(&mut page, &config, Viewport::new(1440, 900), &mut failures)
            .await
            .unwrap();

        assert!(failures.is_empty());
        assert!(page.actions.contains(&"hover button:has-text(\"Discover\")".to_string()));
        assert!(!page.actions.iter().any(|a| a.contains("nav button")));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_checks() {
        let config = fast_config();
        let mut page = FakeLanding::at(768);
        page.scroll_width = Some(820);
        page.broken_routes = vec!["/dashboard"];
        page.errors = vec!["pageerror: boom".to_string()];
        let mut failures = FailureLog::new();

        check_viewport(&mut page, &config, Viewport::new(768, 900), &mut failures)
            .await
            .unwrap();

        let messages: Vec<String> = failures.failures().iter().map(|f| f.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "[768px] Horizontal overflow: 820 > 768",
                "[768px] Start Building CTA bad URL: http://127.0.0.1:4173",
                "[768px] Console errors: pageerror: boom",
            ]
        );
        // The nav anchor check still ran after the CTA failure
        assert!(page.actions.last().unwrap().contains("#districts"));
    }

    #[tokio::test]
    async fn test_settle_waits_for_late_url() {
        struct LatePage {
            polls: usize,
        }

        #[async_trait]
        impl PageDriver for LatePage {
            async fn goto(&mut self, _url: &str) -> SmokeResult<()> {
                Ok(())
            }
            async fn evaluate(&mut self, _e: &str) -> SmokeResult<serde_json::Value> {
                Ok(json!(null))
            }
            async fn click(&mut self, _l: &Locator) -> SmokeResult<()> {
                Ok(())
            }
            async fn hover(&mut self, _l: &Locator) -> SmokeResult<()> {
                Ok(())
            }
            async fn current_url(&mut self) -> SmokeResult<String> {
                self.polls += 1;
                Ok(if self.polls < 3 {
                    "http://x/".to_string()
                } else {
                    "http://x/dashboard".to_string()
                })
            }
            fn take_errors(&mut self) -> Vec<String> {
                Vec::new()
            }
        }

        let mut checks = CheckConfig::default();
        checks.settle_poll_ms = 1;
        let mut page = LatePage { polls: 0 };

        let settled = settle_url(&mut page, &checks, |u| u.contains("/dashboard"))
            .await
            .unwrap();
        assert!(settled.matched);
        assert_eq!(page.polls, 3);
    }

    #[tokio::test]
    async fn test_run_all_covers_every_viewport() {
        let config = fast_config();
        let mut session = FakeSession::new(|page| {
            if page.width == 375 {
                page.scroll_width = Some(400);
            }
            if page.width == 1024 {
                page.broken_routes = vec!["/traces"];
            }
        });

        let report = run_all(&mut session, &config).await.unwrap();

        assert_eq!(session.opened, vec![375, 768, 1024, 1440]);
        assert_eq!(session.closed, 4);
        let widths: Vec<u32> = report.failures.failures().iter().map(|f| f.width).collect();
        assert_eq!(widths, vec![375, 1024]);
    }

    #[tokio::test]
    async fn test_run_all_pass_summary() {
        let config = fast_config();
        let mut session = FakeSession::new(|_| {});

        let summary = run_all(&mut session, &config).await.unwrap().verdict().unwrap();
        assert_eq!(
            summary.to_string(),
            "Landing smoke checks passed for 375/768/1024/1440"
        );
    }

    #[tokio::test]
    async fn test_missing_desktop_anchor_aborts() {
        let config = fast_config();
        let mut session = FakeSession::new(|page| {
            page.no_desktop_anchor = true;
        });

        let err = run_all(&mut session, &config).await.unwrap_err();

        assert!(matches!(err, SmokeError::LocatorTimeout { .. }));
        // Aborted on the first desktop width; its context was still closed
        assert_eq!(session.opened, vec![375, 768, 1024]);
        assert_eq!(session.closed, 3);
    }
}
