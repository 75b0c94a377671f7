use crate::error::{RedirectError, ScanError, TransportError};
use crate::result::RedirectHop;
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const USER_AGENT: &str = concat!(
    "Sitescan/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/trapdoorsec/sitescan)"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A single, unfollowed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Declared `Content-Length`, falling back to the number of body bytes read.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| (!self.body.is_empty()).then_some(self.body.len() as u64))
    }
}

/// One HTTP exchange. Implementations must not follow redirects themselves;
/// [`follow_redirects`] does that so every hop can be recorded.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, ScanError> {
        Self::with_user_agent(USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, ScanError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(50) // Connection pooling
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let request = match method {
            Method::Get => self.client.get(url),
            Method::Head => self.client.head(url),
        };

        let response = request.timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Terminal response of a redirect chain.
#[derive(Debug, Clone)]
pub struct Followed {
    pub response: HttpResponse,
    pub final_url: String,
    pub chain: Vec<RedirectHop>,
}

/// Issue `method` against `url`, following up to `max_redirects` redirects.
pub async fn follow_redirects(
    client: &dyn HttpClient,
    method: Method,
    url: &str,
    timeout: Duration,
    max_redirects: usize,
) -> Result<Followed, RedirectError> {
    let mut current = url.to_string();
    let mut chain = Vec::new();

    loop {
        let response = client.send(method, &current, timeout).await?;

        // A redirect without a usable Location is treated as the terminal response
        let target = response
            .location()
            .filter(|_| response.is_redirect())
            .and_then(|location| Url::parse(&current).and_then(|base| base.join(location)).ok());

        let Some(target) = target else {
            return Ok(Followed {
                response,
                final_url: current,
                chain,
            });
        };

        if chain.len() >= max_redirects {
            return Err(RedirectError::TooManyRedirects {
                limit: max_redirects,
            });
        }

        debug!("{} -> {} ({})", current, target, response.status);
        chain.push(RedirectHop {
            url: current,
            status: response.status,
        });
        current = target.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory client mapping URLs to (status, location)
    struct ScriptedClient {
        routes: HashMap<String, (u16, Option<&'static str>)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(routes: &[(&str, u16, Option<&'static str>)]) -> Self {
            Self {
                routes: routes
                    .iter()
                    .map(|(url, status, location)| (url.to_string(), (*status, *location)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(
            &self,
            _method: Method,
            url: &str,
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(url.to_string());
            let (status, location) = self
                .routes
                .get(url)
                .copied()
                .ok_or_else(|| TransportError::Connect(format!("no route to {}", url)))?;

            let mut headers = HeaderMap::new();
            if let Some(location) = location {
                headers.insert(LOCATION, HeaderValue::from_static(location));
            }
            Ok(HttpResponse {
                status,
                headers,
                body: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_follow_records_chain() {
        let client = ScriptedClient::new(&[
            ("http://site.test/old", 301, Some("/new")),
            ("http://site.test/new", 302, Some("http://site.test/final")),
            ("http://site.test/final", 200, None),
        ]);

        let followed = follow_redirects(
            &client,
            Method::Get,
            "http://site.test/old",
            Duration::from_secs(1),
            5,
        )
        .await
        .unwrap();

        assert_eq!(followed.response.status, 200);
        assert_eq!(followed.final_url, "http://site.test/final");
        assert_eq!(
            followed.chain,
            vec![
                RedirectHop {
                    url: "http://site.test/old".to_string(),
                    status: 301
                },
                RedirectHop {
                    url: "http://site.test/new".to_string(),
                    status: 302
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_redirect_limit_is_inclusive() {
        let client = ScriptedClient::new(&[
            ("http://site.test/0", 302, Some("/1")),
            ("http://site.test/1", 302, Some("/2")),
            ("http://site.test/2", 200, None),
        ]);

        let ok = follow_redirects(&client, Method::Get, "http://site.test/0", Duration::from_secs(1), 2).await;
        assert!(ok.is_ok());

        let err = follow_redirects(&client, Method::Get, "http://site.test/0", Duration::from_secs(1), 1).await;
        assert_eq!(err.unwrap_err(), RedirectError::TooManyRedirects { limit: 1 });
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_terminal() {
        let client = ScriptedClient::new(&[("http://site.test/", 302, None)]);

        let followed = follow_redirects(&client, Method::Head, "http://site.test/", Duration::from_secs(1), 5)
            .await
            .unwrap();

        assert_eq!(followed.response.status, 302);
        assert!(followed.chain.is_empty());
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = ScriptedClient::new(&[("http://site.test/", 301, Some("http://gone.test/"))]);

        let err = follow_redirects(&client, Method::Get, "http://site.test/", Duration::from_secs(1), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, RedirectError::Transport(TransportError::Connect(_))));
    }

    #[test]
    fn test_content_length_falls_back_to_body() {
        let response = HttpResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: b"hello".to_vec(),
        };
        assert_eq!(response.content_length(), Some(5));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        let response = HttpResponse {
            status: 200,
            headers,
            body: Vec::new(),
        };
        assert_eq!(response.content_length(), Some(1024));
    }
}
