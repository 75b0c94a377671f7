use crate::client::{HttpClient, Method, follow_redirects};
use crate::error::{Result, ScanError};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub priority: Option<f32>,
    pub changefreq: Option<String>,
}

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapNode {
    /// `<sitemapindex>`: child sitemap locations in document order
    Index(Vec<String>),
    /// `<urlset>`: leaf pages in document order
    UrlSet(Vec<SitemapEntry>),
}

/// A leaf URL in the flattened, deduplicated sitemap tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    pub order_index: usize,
    pub url: String,
    pub lastmod: Option<String>,
    pub priority: Option<f32>,
    pub changefreq: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Deepest allowed nesting below the root document (the root is depth 0)
    pub max_depth: usize,
    pub http_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            http_timeout: Duration::from_secs(30),
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Index,
    UrlSet,
}

#[derive(Debug, Default)]
struct Record {
    loc: Option<String>,
    lastmod: Option<String>,
    priority: Option<String>,
    changefreq: Option<String>,
}

/// Parse a sitemap or sitemap-index document. Element namespaces are ignored.
pub fn parse_sitemap(xml: &[u8]) -> std::result::Result<SitemapNode, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut root: Option<RootKind> = None;
    let mut open: Vec<String> = Vec::new();
    let mut record: Option<Record> = None;
    let mut text = String::new();
    let mut children = Vec::new();
    let mut entries = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(format!(
                    "malformed XML at position {}: {}",
                    reader.error_position(),
                    e
                ));
            }
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if open.is_empty() {
                    if root.is_some() {
                        return Err("multiple root elements".to_string());
                    }
                    root = Some(root_kind(&name)?);
                } else if open.len() == 1 && is_record(root, &name) {
                    record = Some(Record::default());
                }
                open.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if open.is_empty() {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    if root.is_some() {
                        return Err("multiple root elements".to_string());
                    }
                    root = Some(root_kind(&name)?);
                }
            }
            Ok(Event::Text(e)) => {
                let unescaped = e.unescape().map_err(|e| format!("invalid text: {}", e))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                let name = open.pop().unwrap_or_default();
                let value = text.trim().to_string();
                text.clear();

                match open.len() {
                    2 => {
                        if let Some(record) = record.as_mut()
                            && !value.is_empty()
                        {
                            match name.as_str() {
                                "loc" => record.loc = Some(value),
                                "lastmod" => record.lastmod = Some(value),
                                "priority" => record.priority = Some(value),
                                "changefreq" => record.changefreq = Some(value),
                                _ => {}
                            }
                        }
                    }
                    1 => {
                        if let Some(finished) = record.take() {
                            match (root, finished.loc) {
                                (Some(RootKind::Index), Some(loc)) => children.push(loc),
                                (Some(RootKind::UrlSet), Some(loc)) => {
                                    entries.push(SitemapEntry {
                                        priority: finished
                                            .priority
                                            .as_deref()
                                            .and_then(|p| parse_priority(&loc, p)),
                                        loc,
                                        lastmod: finished.lastmod,
                                        changefreq: finished.changefreq,
                                    })
                                }
                                _ => debug!("Ignoring <{}> without <loc>", name),
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(format!("unexpected end of document inside <{}>", open.join("/")));
    }

    match root {
        Some(RootKind::Index) => Ok(SitemapNode::Index(children)),
        Some(RootKind::UrlSet) => Ok(SitemapNode::UrlSet(entries)),
        None => Err("missing root element".to_string()),
    }
}

fn root_kind(name: &str) -> std::result::Result<RootKind, String> {
    match name {
        "sitemapindex" => Ok(RootKind::Index),
        "urlset" => Ok(RootKind::UrlSet),
        other => Err(format!(
            "unexpected root element <{}>, expected <sitemapindex> or <urlset>",
            other
        )),
    }
}

fn is_record(root: Option<RootKind>, name: &str) -> bool {
    matches!(
        (root, name),
        (Some(RootKind::Index), "sitemap") | (Some(RootKind::UrlSet), "url")
    )
}

fn parse_priority(loc: &str, raw: &str) -> Option<f32> {
    match raw.parse::<f32>() {
        Ok(p) if (0.0..=1.0).contains(&p) => Some(p),
        _ => {
            debug!("Dropping invalid priority '{}' for {}", raw, loc);
            None
        }
    }
}

/// Deduplication key for a URL: lower-cased scheme and host, default port
/// dropped, no fragment, trailing slash ignored, query preserved.
pub fn normalize_url(raw: &str) -> std::result::Result<String, url::ParseError> {
    Url::parse(raw.trim()).map(|url| normalized_key(&url))
}

fn normalized_key(url: &Url) -> String {
    let mut key = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        key.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Flattens a (possibly nested) sitemap into an ordered list of leaf URLs.
///
/// Holds no state between calls: the visited set and the output list live
/// only for the duration of one [`SitemapResolver::resolve`].
pub struct SitemapResolver {
    client: Arc<dyn HttpClient>,
    options: ResolveOptions,
}

impl SitemapResolver {
    pub fn new(client: Arc<dyn HttpClient>, options: ResolveOptions) -> Self {
        Self { client, options }
    }

    /// Depth-first, children in document order. Fails fast on any unreachable
    /// or malformed document; no partial list is ever returned.
    pub async fn resolve(&self, root_url: &str) -> Result<Vec<ResolvedUrl>> {
        let root = Url::parse(root_url.trim())
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", root_url, e)))?;

        info!(
            "Resolving sitemap {} (max depth {})",
            root, self.options.max_depth
        );

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut resolved: Vec<ResolvedUrl> = Vec::new();
        let mut pending: Vec<(Url, usize)> = vec![(root, 0)];

        while let Some((sitemap_url, depth)) = pending.pop() {
            if !visited.insert(normalized_key(&sitemap_url)) {
                debug!("Skipping already visited sitemap {}", sitemap_url);
                continue;
            }

            let (base, body) = self.fetch(&sitemap_url).await?;
            if base != sitemap_url && !visited.insert(normalized_key(&base)) {
                debug!("{} redirected to already visited sitemap {}", sitemap_url, base);
                continue;
            }
            let node = parse_sitemap(&body).map_err(|reason| ScanError::Parse {
                url: sitemap_url.to_string(),
                reason,
            })?;

            match node {
                SitemapNode::Index(children) => {
                    debug!(
                        "Sitemap index {} lists {} children (depth {})",
                        sitemap_url,
                        children.len(),
                        depth
                    );

                    let mut next = Vec::with_capacity(children.len());
                    for child in children {
                        let child_url = base.join(&child).map_err(|e| ScanError::Parse {
                            url: sitemap_url.to_string(),
                            reason: format!("invalid child sitemap location '{}': {}", child, e),
                        })?;

                        // Local files are only reachable from documents that were local themselves
                        if child_url.scheme() == "file" && base.scheme() != "file" {
                            return Err(ScanError::Fetch {
                                url: child_url.to_string(),
                                reason: format!("local file referenced from remote sitemap {}", base),
                            });
                        }

                        if visited.contains(&normalized_key(&child_url)) {
                            debug!("Skipping cyclic sitemap reference to {}", child_url);
                            continue;
                        }

                        if depth + 1 > self.options.max_depth {
                            return Err(ScanError::DepthExceeded {
                                url: child_url.to_string(),
                                max_depth: self.options.max_depth,
                            });
                        }

                        next.push((child_url, depth + 1));
                    }

                    // Stack: push in reverse so the first child is resolved first
                    pending.extend(next.into_iter().rev());
                }
                SitemapNode::UrlSet(entries) => {
                    let before = resolved.len();
                    for entry in entries {
                        let page_url = match base.join(&entry.loc) {
                            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
                            Ok(u) => {
                                warn!("Skipping non-HTTP location {} in {}", u, sitemap_url);
                                continue;
                            }
                            Err(e) => {
                                warn!(
                                    "Skipping invalid location '{}' in {}: {}",
                                    entry.loc, sitemap_url, e
                                );
                                continue;
                            }
                        };

                        if !seen.insert(normalized_key(&page_url)) {
                            continue;
                        }

                        resolved.push(ResolvedUrl {
                            order_index: resolved.len(),
                            url: page_url.to_string(),
                            lastmod: entry.lastmod,
                            priority: entry.priority,
                            changefreq: entry.changefreq,
                        });
                    }
                    debug!(
                        "Urlset {} contributed {} new URLs",
                        sitemap_url,
                        resolved.len() - before
                    );
                }
            }
        }

        info!(
            "Resolved {} unique URLs from {} sitemap(s)",
            resolved.len(),
            visited.len()
        );
        Ok(resolved)
    }

    /// Returns the document body and the URL it was finally served from,
    /// against which its relative locations resolve.
    async fn fetch(&self, url: &Url) -> Result<(Url, Vec<u8>)> {
        let fetch_error = |reason: String| ScanError::Fetch {
            url: url.to_string(),
            reason,
        };

        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| fetch_error("not a local file path".to_string()))?;
            let body = tokio::fs::read(&path)
                .await
                .map_err(|e| fetch_error(e.to_string()))?;
            return Ok((url.clone(), body));
        }

        debug!("Fetching sitemap {}", url);
        let followed = tokio::time::timeout(
            self.options.http_timeout,
            follow_redirects(
                self.client.as_ref(),
                Method::Get,
                url.as_str(),
                self.options.http_timeout,
                self.options.max_redirects,
            ),
        )
        .await
        .map_err(|_| fetch_error("timeout".to_string()))?
        .map_err(|e| fetch_error(e.to_string()))?;

        if !followed.response.is_success() {
            return Err(fetch_error(format!("HTTP {}", followed.response.status)));
        }

        let base = Url::parse(&followed.final_url).unwrap_or_else(|_| url.clone());
        Ok((base, followed.response.body))
    }
}
