use crate::seo::PageSignals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status: u16,
}

/// Probe-level failure classes. These are recorded per URL and never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    HttpStatus,
    TooManyRedirects,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::HttpStatus => "http_status",
            FailureKind::TooManyRedirects => "too_many_redirects",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success {
        http_status: u16,
        latency: Duration,
        content_length: Option<u64>,
        final_url: String,
        redirect_chain: Vec<RedirectHop>,
        signals: PageSignals,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Terminal status for `HttpStatus` failures.
        http_status: Option<u16>,
    },
}

/// Outcome of probing one resolved URL, keyed back to it by order index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub order_index: usize,
    pub url: String,
    pub outcome: ProbeOutcome,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn new(order_index: usize, url: String, outcome: ProbeOutcome) -> Self {
        Self {
            order_index,
            url,
            outcome,
            checked_at: Utc::now(),
        }
    }

    pub fn failure(order_index: usize, url: String, kind: FailureKind, message: String) -> Self {
        Self::new(
            order_index,
            url,
            ProbeOutcome::Failure {
                kind,
                message,
                http_status: None,
            },
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            ProbeOutcome::Failure { kind, .. } => Some(kind),
            ProbeOutcome::Success { .. } => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self.outcome {
            ProbeOutcome::Success { http_status, .. } => Some(http_status),
            ProbeOutcome::Failure { http_status, .. } => http_status,
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        match self.outcome {
            ProbeOutcome::Success { latency, .. } => Some(latency),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    pub fn redirect_count(&self) -> usize {
        match &self.outcome {
            ProbeOutcome::Success { redirect_chain, .. } => redirect_chain.len(),
            ProbeOutcome::Failure { .. } => 0,
        }
    }

    pub fn signals(&self) -> Option<&PageSignals> {
        match &self.outcome {
            ProbeOutcome::Success { signals, .. } => Some(signals),
            ProbeOutcome::Failure { .. } => None,
        }
    }
}
