//! Chrome DevTools Protocol implementation of the browser traits

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::log::{
    EnableParams as LogEnableParams, EventEntryAdded, LogEntrySource, LogEntryLevel,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EvaluateParams, EventConsoleApiCalled, EventExceptionThrown,
    ExceptionDetails, RemoteObject,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::browser::{BrowserLauncher, BrowserSession, PageDriver, Viewport};
use crate::config::BrowserConfig;
use crate::error::{SmokeError, SmokeResult};
use crate::locator::{Locator, Resolution};

const RESOLVE_POLL: Duration = Duration::from_millis(50);
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Launches Chrome/Chromium through chromiumoxide
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self, config: &BrowserConfig) -> SmokeResult<ChromeSession> {
        let mut builder = CdpConfig::builder();

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref path) = config.executable {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(SmokeError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| SmokeError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler: {}", e);
                }
            }
        });

        info!("Browser launched (headless: {})", config.headless);

        Ok(ChromeSession {
            browser,
            handler,
            config: config.clone(),
        })
    }
}

/// A launched browser
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    type Page = ChromePage;

    async fn open_page(&mut self, viewport: Viewport) -> SmokeResult<ChromePage> {
        let context = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(SmokeError::Browser)?;
        let page = self.browser.new_page(target).await?;

        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(viewport.width))
                .height(i64::from(viewport.height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(SmokeError::Browser)?,
        )
        .await?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let network = Arc::new(Mutex::new(NetworkActivity::new(Instant::now())));

        let mut listeners = attach_error_listeners(&page, errors.clone()).await?;
        listeners.extend(attach_network_listeners(&page, network.clone()).await?);

        debug!("Opened page {}x{}", viewport.width, viewport.height);

        Ok(ChromePage {
            page,
            context,
            errors,
            network,
            listeners,
            config: self.config.clone(),
            marks: 0,
        })
    }

    async fn close_page(&mut self, page: ChromePage) -> SmokeResult<()> {
        let ChromePage {
            page,
            context,
            listeners,
            ..
        } = page;

        for listener in listeners {
            listener.abort();
        }
        let closed = page.close().await;
        let disposed = self.browser.dispose_browser_context(context).await;
        first_failure(closed, disposed)?;
        Ok(())
    }

    async fn close(mut self) -> SmokeResult<()> {
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

/// A page in its own browsing context, with error and network listeners
pub struct ChromePage {
    page: Page,
    context: BrowserContextId,
    errors: Arc<Mutex<Vec<String>>>,
    network: Arc<Mutex<NetworkActivity>>,
    listeners: Vec<JoinHandle<()>>,
    config: BrowserConfig,
    marks: u64,
}

impl ChromePage {
    async fn wait_for_network_idle(&self, url: &str) -> SmokeResult<()> {
        let deadline = Instant::now() + self.config.navigation_timeout();
        let quiet = self.config.network_idle();

        loop {
            let now = Instant::now();
            let inflight = {
                let network = self.network.lock();
                if network.is_idle(now, quiet) {
                    return Ok(());
                }
                network.inflight()
            };

            if now >= deadline {
                return Err(SmokeError::Navigation {
                    url: url.to_string(),
                    reason: format!(
                        "network not idle after {} ms ({} request(s) in flight)",
                        self.config.navigation_timeout_ms, inflight
                    ),
                });
            }
            sleep(IDLE_POLL).await;
        }
    }

    /// Wait for `locator` to resolve to a visible element
    async fn resolve(&mut self, locator: &Locator) -> SmokeResult<Element> {
        self.marks += 1;
        let token = format!("smoke-{}", self.marks);
        let script = locator.resolver_script(&token);
        let start = Instant::now();

        loop {
            let value = self.evaluate(&script).await?;
            let state = value
                .as_str()
                .and_then(Resolution::parse)
                .ok_or_else(|| SmokeError::Browser(format!("unexpected resolver result: {}", value)))?;

            if state == Resolution::Ready {
                let element = self.page.find_element(Locator::marked_selector(&token)).await?;
                return Ok(element);
            }

            if start.elapsed() >= self.config.action_timeout() {
                return Err(SmokeError::LocatorTimeout {
                    locator: locator.to_string(),
                    state: state.as_str().to_string(),
                    timeout_ms: self.config.action_timeout_ms,
                });
            }
            sleep(RESOLVE_POLL).await;
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&mut self, url: &str) -> SmokeResult<()> {
        debug!("goto {}", url);
        self.network.lock().reset(Instant::now());

        match timeout(self.config.navigation_timeout(), self.page.goto(url)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                return Err(SmokeError::Navigation {
                    url: url.to_string(),
                    reason: format!("load not reached after {} ms", self.config.navigation_timeout_ms),
                });
            }
        }

        self.wait_for_network_idle(url).await
    }

    async fn evaluate(&mut self, expression: &str) -> SmokeResult<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .build()
            .map_err(SmokeError::Browser)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value()?)
    }

    async fn click(&mut self, locator: &Locator) -> SmokeResult<()> {
        debug!("click {}", locator);
        let element = self.resolve(locator).await?;
        element.click().await?;
        Ok(())
    }

    async fn hover(&mut self, locator: &Locator) -> SmokeResult<()> {
        debug!("hover {}", locator);
        let element = self.resolve(locator).await?;
        element.hover().await?;
        Ok(())
    }

    async fn current_url(&mut self) -> SmokeResult<String> {
        let value = self.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SmokeError::Browser(format!("location.href was not a string: {}", value)))
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }
}

async fn attach_error_listeners(
    page: &Page,
    errors: Arc<Mutex<Vec<String>>>,
) -> SmokeResult<Vec<JoinHandle<()>>> {
    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let sink = errors.clone();
    let on_exception = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let message = exception_message(&event.exception_details);
            sink.lock().push(format!("pageerror: {}", message));
        }
    });

    let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
    let sink = errors.clone();
    let on_console = tokio::spawn(async move {
        while let Some(event) = console.next().await {
            if event.r#type == ConsoleApiCalledType::Error {
                sink.lock().push(format!("console: {}", console_text(&event.args)));
            }
        }
    });

    // Browser-side errors (failed loads, CSP violations) only arrive through the Log domain
    let mut entries = page.event_listener::<EventEntryAdded>().await?;
    let on_log = tokio::spawn(async move {
        while let Some(event) = entries.next().await {
            let entry = &event.entry;
            if let Some(message) = log_entry_error(&entry.source, &entry.level, &entry.text) {
                errors.lock().push(message);
            }
        }
    });
    page.execute(LogEnableParams::default()).await?;

    Ok(vec![on_exception, on_console, on_log])
}

#[derive(Debug)]
enum RequestEvent {
    Started(String),
    Done(String),
}

async fn attach_network_listeners(
    page: &Page,
    network: Arc<Mutex<NetworkActivity>>,
) -> SmokeResult<Vec<JoinHandle<()>>> {
    let sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await?
        .map(|event| RequestEvent::Started(event.request_id.inner().clone()));
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await?
        .map(|event| RequestEvent::Done(event.request_id.inner().clone()));
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await?
        .map(|event| RequestEvent::Done(event.request_id.inner().clone()));

    let mut events = stream::select(sent, stream::select(finished, failed));
    let on_request = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let mut activity = network.lock();
            match event {
                RequestEvent::Started(id) => activity.started(id, Instant::now()),
                RequestEvent::Done(id) => activity.done(&id, Instant::now()),
            }
        }
    });

    Ok(vec![on_request])
}

/// In-flight request bookkeeping for network-idle detection.
///
/// Each CDP event type has its own channel, so a completion can be seen
/// before the matching start. Such ids are remembered in `finished_early`
/// and the late start is then ignored.
#[derive(Debug, Clone)]
pub struct NetworkActivity {
    inflight: HashSet<String>,
    finished_early: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    pub fn new(now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            finished_early: HashSet::new(),
            last_change: now,
        }
    }

    pub fn started(&mut self, request_id: String, now: Instant) {
        self.last_change = now;
        if !self.finished_early.remove(&request_id) {
            self.inflight.insert(request_id);
        }
    }

    pub fn done(&mut self, request_id: &str, now: Instant) {
        if self.inflight.remove(request_id) {
            self.last_change = now;
        } else {
            self.finished_early.insert(request_id.to_string());
        }
    }

    /// Forget requests of the previous document
    pub fn reset(&mut self, now: Instant) {
        self.inflight.clear();
        self.finished_early.clear();
        self.last_change = now;
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Idle once nothing has been in flight for `quiet`
    pub fn is_idle(&self, now: Instant, quiet: Duration) -> bool {
        self.inflight.is_empty() && now.saturating_duration_since(self.last_change) >= quiet
    }
}

fn exception_message(details: &ExceptionDetails) -> String {
    details
        .exception
        .as_ref()
        .and_then(|exception| exception.description.as_deref())
        .and_then(|description| description.lines().next())
        .map(str::to_string)
        .unwrap_or_else(|| details.text.clone())
}

/// Error-level Log domain entry as a console error.
///
/// `javascript` entries duplicate `Runtime.consoleAPICalled`.
fn log_entry_error(source: &LogEntrySource, level: &LogEntryLevel, text: &str) -> Option<String> {
    match (source, level) {
        (LogEntrySource::Javascript, _) => None,
        (_, LogEntryLevel::Error) => Some(format!("console: {}", text)),
        _ => None,
    }
}

/// `first` if it failed, otherwise `second`
fn first_failure<E>(first: Result<(), E>, second: Result<(), E>) -> Result<(), E> {
    first.and(second)
}

fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .filter_map(|arg| remote_text(arg.value.as_ref(), arg.description.as_deref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn remote_text(value: Option<&serde_json::Value>, description: Option<&str>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
        None => description.map(str::to_string),
    }
}
