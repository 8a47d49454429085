//! Element locators and the in-page script that resolves them
//!
//! A locator resolves to the first matching element in document order. The
//! resolver marks that element with [`MARKER_ATTR`] so a plain CSS query can
//! hand it to the CDP input layer.

use std::fmt;

/// Attribute placed on the resolved element
pub const MARKER_ATTR: &str = "data-landing-smoke";

/// How an element is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Elements matching `selector` whose text contains `text`
    /// (case-insensitive, whitespace-normalised)
    Text { selector: String, text: String },

    /// First visible element matching `selector`
    Visible { selector: String },

    /// First element matching `selector`
    Css { selector: String },
}

impl Locator {
    pub fn link_text(text: &str) -> Self {
        Self::Text {
            selector: "a".to_string(),
            text: text.to_string(),
        }
    }

    pub fn button_text(text: &str) -> Self {
        Self::Text {
            selector: "button".to_string(),
            text: text.to_string(),
        }
    }

    pub fn visible(selector: &str) -> Self {
        Self::Visible {
            selector: selector.to_string(),
        }
    }

    pub fn css(selector: &str) -> Self {
        Self::Css {
            selector: selector.to_string(),
        }
    }

    /// Link pointing at `href`, e.g. an in-page anchor
    pub fn href(href: &str) -> Self {
        Self::css(&format!("a[href={}]", js_string(href)))
    }

    fn selector(&self) -> &str {
        match self {
            Self::Text { selector, .. } | Self::Visible { selector } | Self::Css { selector } => {
                selector
            }
        }
    }

    fn filter(&self) -> String {
        match self {
            Self::Text { text, .. } => format!(
                "(el) => norm(el.innerText || el.textContent).includes(norm({}))",
                js_string(text)
            ),
            Self::Visible { .. } => "visible".to_string(),
            Self::Css { .. } => "() => true".to_string(),
        }
    }

    /// Selector matching the element once the resolver has marked it with `token`
    pub fn marked_selector(token: &str) -> String {
        format!("[{}={}]", MARKER_ATTR, js_string(token))
    }

    /// JavaScript expression that resolves this locator and marks the match
    /// with `token`. Evaluates to a [`Resolution`] name.
    pub fn resolver_script(&self, token: &str) -> String {
        format!(
            r#"(() => {{
  const norm = (t) => (t || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const visible = (el) => {{
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden';
  }};
  document.querySelectorAll('[{marker}]').forEach((el) => el.removeAttribute('{marker}'));
  const el = Array.from(document.querySelectorAll({selector})).filter({filter})[0];
  if (!el) return 'missing';
  if (!visible(el)) return 'hidden';
  el.setAttribute('{marker}', {token});
  return 'ready';
}})()"#,
            marker = MARKER_ATTR,
            selector = js_string(self.selector()),
            filter = self.filter(),
            token = js_string(token),
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { selector, text } => write!(f, "{}:has-text({:?})", selector, text),
            Self::Visible { selector } => write!(f, "{}:visible", selector),
            Self::Css { selector } => write!(f, "{}", selector),
        }
    }
}

/// Outcome of one resolver run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Missing,
    Hidden,
    Ready,
}

impl Resolution {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "missing" => Some(Self::Missing),
            "hidden" => Some(Self::Hidden),
            "ready" => Some(Self::Ready),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Hidden => "hidden",
            Self::Ready => "ready",
        }
    }
}

/// Quote `value` as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
