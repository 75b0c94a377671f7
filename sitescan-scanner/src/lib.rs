pub mod aggregate;
pub mod cancel;
pub mod client;
pub mod error;
pub mod probe;
pub mod result;
pub mod seo;
pub mod sitemap;

pub use aggregate::{AnalysisReport, LatencyStats, ReportEntry, ResultAggregator, Summary};
pub use cancel::{CancelSource, CancelToken};
pub use client::{HttpClient, ReqwestClient};
pub use error::ScanError;
pub use probe::{ProbeOptions, ProbeStrategy, ProbeWorkerPool};
pub use result::{FailureKind, ProbeOutcome, ProbeResult};
pub use sitemap::{ResolveOptions, ResolvedUrl, SitemapResolver};
