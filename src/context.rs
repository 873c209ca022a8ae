use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::archive::mux::Muxer;
use crate::catalog::CatalogClient;
use crate::hls::fetcher::{RetryPolicy, SegmentFetcher};

/// Everything a pipeline run needs, threaded explicitly instead of being
/// reachable through back-pointers on catalog objects.
pub struct Context {
    pub catalog: Arc<dyn CatalogClient>,
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub muxer: Arc<dyn Muxer>,
    /// Parallel segment workers per variant.
    pub parallelism: usize,
    pub retry: RetryPolicy,
    /// Base directory for per-episode scratch directories.
    pub scratch_base: PathBuf,
    /// Composed cancellation signal: user interrupt or fatal worker error.
    pub cancel: CancellationToken,
}
