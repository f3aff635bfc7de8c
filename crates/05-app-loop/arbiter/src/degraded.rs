//! Dependency-free status page painted when everything else failed.
//!
//! The markup is built once at construction, so rendering is a plain string
//! write with no failure path: no network, no loaded assets, no allocation
//! that depends on page state.

use std::fmt::Write as _;

use crate::surface::DisplaySurface;

/// One line of static contact information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactLine {
    pub label: String,
    pub value: String,
    /// Link target (`tel:`, `mailto:`, ...). Rendered as plain text when absent.
    pub href: Option<String>,
}

impl ContactLine {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            href: None,
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }
}

/// Text of the degraded page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegradedContent {
    pub title: String,
    pub message: String,
    pub retry_label: String,
    pub contacts: Vec<ContactLine>,
}

impl Default for DegradedContent {
    fn default() -> Self {
        Self {
            title: "This page is temporarily unavailable".to_owned(),
            message: "Some parts of the site could not be loaded. Please try again, \
                      or reach us directly using the details below."
                .to_owned(),
            retry_label: "Try again".to_owned(),
            contacts: Vec::new(),
        }
    }
}

/// Paints [`DegradedContent`] onto a display surface.
#[derive(Clone, Debug)]
pub struct DegradedRenderer {
    markup: String,
}

impl Default for DegradedRenderer {
    fn default() -> Self {
        Self::new(&DegradedContent::default())
    }
}

impl DegradedRenderer {
    pub fn new(content: &DegradedContent) -> Self {
        Self {
            markup: build_markup(content),
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Paints the status page, creating the root first if the page has none.
    pub fn render(&self, surface: &dyn DisplaySurface) {
        if !surface.exists() {
            surface.create();
        }
        surface.paint(&self.markup);
    }
}

fn build_markup(content: &DegradedContent) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(r#"<section class="degraded-mode" role="alert" aria-live="assertive">"#);
    let _ = write!(out, "<h1>{}</h1>", escape(&content.title));
    let _ = write!(out, "<p>{}</p>", escape(&content.message));
    let _ = write!(
        out,
        r#"<button type="button" onclick="window.location.reload()">{}</button>"#,
        escape(&content.retry_label)
    );
    if !content.contacts.is_empty() {
        out.push_str(r#"<ul class="degraded-mode-contact">"#);
        for line in &content.contacts {
            let _ = write!(out, "<li><span>{}</span> ", escape(&line.label));
            match &line.href {
                Some(href) => {
                    let _ = write!(
                        out,
                        r#"<a href="{}">{}</a>"#,
                        escape(href),
                        escape(&line.value)
                    );
                }
                None => out.push_str(&escape(&line.value)),
            }
            out.push_str("</li>");
        }
        out.push_str("</ul>");
    }
    out.push_str("</section>");
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
