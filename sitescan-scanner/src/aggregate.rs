use crate::result::{FailureKind, ProbeResult};
use crate::sitemap::ResolvedUrl;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub resolved: ResolvedUrl,
    /// `None` only when a cancelled run never reached this URL
    pub result: Option<ProbeResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    /// Over successful probes only
    pub latency: Option<LatencyStats>,
}

impl Summary {
    /// Percentage of all URLs that were probed successfully.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64 * 100.0
        }
    }
}

/// Results in sitemap discovery order, whatever order the probes completed in.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub entries: Vec<ReportEntry>,
    pub summary: Summary,
    /// False when the run was cancelled before every URL was probed
    pub complete: bool,
}

impl AnalysisReport {
    pub fn results(&self) -> impl Iterator<Item = &ProbeResult> {
        self.entries.iter().filter_map(|e| e.result.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results().filter(|r| !r.is_success())
    }
}

/// Places results into a pre-sized slot per input URL, matched by order index.
///
/// The input may be any subset of a resolved sitemap in any order; entries keep
/// the input order.
pub struct ResultAggregator {
    urls: Vec<ResolvedUrl>,
    positions: HashMap<usize, usize>,
    slots: Vec<Option<ProbeResult>>,
    received: usize,
}

impl ResultAggregator {
    pub fn new(urls: Vec<ResolvedUrl>) -> Self {
        let mut positions = HashMap::with_capacity(urls.len());
        for (position, url) in urls.iter().enumerate() {
            if positions.insert(url.order_index, position).is_some() {
                warn!("Order index {} appears more than once in the input", url.order_index);
            }
        }
        let slots = (0..urls.len()).map(|_| None).collect();
        Self {
            urls,
            positions,
            slots,
            received: 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.slots.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected()
    }

    /// Store a result in its slot. Unknown and duplicate indices are rejected.
    pub fn insert(&mut self, result: ProbeResult) -> bool {
        let index = result.order_index;
        let slot = self
            .positions
            .get(&index)
            .and_then(|&position| self.slots.get_mut(position));
        match slot {
            Some(slot) if slot.is_none() => {
                *slot = Some(result);
                self.received += 1;
                true
            }
            Some(_) => {
                warn!("Dropping duplicate result for order index {}", index);
                false
            }
            None => {
                warn!("Dropping result with unknown order index {}", index);
                false
            }
        }
    }

    /// Drain `rx` until every slot is filled or every sender is gone.
    pub async fn collect(&mut self, mut rx: mpsc::Receiver<ProbeResult>) {
        while !self.is_complete() {
            match rx.recv().await {
                Some(result) => {
                    self.insert(result);
                }
                None => {
                    debug!(
                        "Result channel closed with {}/{} results",
                        self.received,
                        self.expected()
                    );
                    break;
                }
            }
        }
    }

    pub fn finish(self) -> AnalysisReport {
        let complete = self.is_complete();
        let summary = summarize(&self.slots);
        let entries = self
            .urls
            .into_iter()
            .zip(self.slots)
            .map(|(resolved, result)| ReportEntry { resolved, result })
            .collect();

        AnalysisReport {
            entries,
            summary,
            complete,
        }
    }
}

fn summarize(slots: &[Option<ProbeResult>]) -> Summary {
    let mut summary = Summary {
        total: slots.len(),
        ..Summary::default()
    };
    let mut latencies = Vec::new();

    for slot in slots {
        match slot {
            None => summary.pending += 1,
            Some(result) => match result.failure_kind() {
                None => {
                    summary.succeeded += 1;
                    latencies.extend(result.latency());
                }
                Some(kind) => {
                    summary.failed += 1;
                    *summary.failures_by_kind.entry(kind).or_insert(0) += 1;
                }
            },
        }
    }

    summary.latency = latency_stats(latencies);
    summary
}

fn latency_stats(mut latencies: Vec<Duration>) -> Option<LatencyStats> {
    if latencies.is_empty() {
        return None;
    }
    latencies.sort();

    let total: Duration = latencies.iter().sum();
    Some(LatencyStats {
        min: latencies[0],
        mean: total / latencies.len() as u32,
        p50: nearest_rank(&latencies, 50.0),
        p95: nearest_rank(&latencies, 95.0),
    })
}

fn nearest_rank(sorted: &[Duration], percentile: f64) -> Duration {
    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
