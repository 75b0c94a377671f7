//! On-page SEO signals pulled from an HTML document.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

const TITLE_MAX: usize = 60;
const TITLE_MIN: usize = 30;
const DESCRIPTION_MAX: usize = 160;
const DESCRIPTION_MIN: usize = 120;

/// Signals extracted from a page. Missing values are empty, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSignals {
    pub title: String,
    pub meta_description: String,
    pub h1: Vec<String>,
    pub canonical: Option<String>,
    pub robots: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub has_structured_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl SeoIssue {
    fn error(message: &str) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.to_string(),
        }
    }

    fn warning(message: &str) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.to_string(),
        }
    }
}

/// True when a `Content-Type` header denotes an HTML document.
pub fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml+xml")
        })
        .unwrap_or(false)
}

pub fn extract_signals(html: &str) -> PageSignals {
    let document = Html::parse_document(html);

    let title = select_all(&document, "title")
        .first()
        .map(element_text)
        .unwrap_or_default();

    let h1 = select_all(&document, "h1")
        .iter()
        .map(element_text)
        .collect();

    let mut signals = PageSignals {
        title,
        h1,
        ..PageSignals::default()
    };

    for meta in select_all(&document, "meta") {
        let element = meta.value();
        let Some(content) = element.attr("content").map(|c| c.trim().to_string()) else {
            continue;
        };

        let name = element.attr("name").map(str::to_ascii_lowercase);
        let property = element.attr("property").map(str::to_ascii_lowercase);

        match (name.as_deref(), property.as_deref()) {
            (Some("description"), _) if signals.meta_description.is_empty() => {
                signals.meta_description = content
            }
            (Some("robots"), _) if signals.robots.is_none() => signals.robots = Some(content),
            (_, Some("og:title")) if signals.og_title.is_none() => signals.og_title = Some(content),
            (_, Some("og:description")) if signals.og_description.is_none() => {
                signals.og_description = Some(content)
            }
            _ => {}
        }
    }

    signals.canonical = select_all(&document, "link[rel][href]")
        .into_iter()
        .find(|link| {
            link.value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
                .unwrap_or(false)
        })
        .and_then(|link| link.value().attr("href"))
        .map(|href| href.trim().to_string());

    signals.has_structured_data = select_all(&document, "script[type]").iter().any(|script| {
        script
            .value()
            .attr("type")
            .map(|t| t.eq_ignore_ascii_case("application/ld+json"))
            .unwrap_or(false)
    }) || !select_all(&document, "[itemtype]").is_empty()
        || html.contains("@type");

    signals
}

impl PageSignals {
    /// Findings for this page: missing essentials are errors, everything else warnings.
    pub fn issues(&self) -> Vec<SeoIssue> {
        let mut issues = Vec::new();

        let title_len = self.title.chars().count();
        if title_len == 0 {
            issues.push(SeoIssue::error("Missing title"));
        } else if title_len > TITLE_MAX {
            issues.push(SeoIssue::warning("Title too long (>60 characters)"));
        } else if title_len < TITLE_MIN {
            issues.push(SeoIssue::warning("Title too short (<30 characters)"));
        }

        let description_len = self.meta_description.chars().count();
        if description_len == 0 {
            issues.push(SeoIssue::error("Missing meta description"));
        } else if description_len > DESCRIPTION_MAX {
            issues.push(SeoIssue::warning("Meta description too long (>160 characters)"));
        } else if description_len < DESCRIPTION_MIN {
            issues.push(SeoIssue::warning("Meta description too short (<120 characters)"));
        }

        match self.h1.len() {
            0 => issues.push(SeoIssue::error("Missing H1")),
            1 => {}
            _ => issues.push(SeoIssue::warning("Multiple H1 tags")),
        }

        if self.og_title.is_none() {
            issues.push(SeoIssue::warning("Missing og:title"));
        }
        if self.og_description.is_none() {
            issues.push(SeoIssue::warning("Missing og:description"));
        }
        if !self.has_structured_data {
            issues.push(SeoIssue::warning("Missing structured markup"));
        }

        issues
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
