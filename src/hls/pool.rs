use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::errors::{Error, Result};
use crate::hls::fetcher::{RetryPolicy, SegmentCipher, SegmentFetcher, fetch_segment};
use crate::hls::types::{Segment, SegmentKey};

/// Downloads all segments of one variant with a fixed number of parallel
/// workers, writing each decrypted segment to `<index>.ts` in the scratch
/// directory.
///
/// Writes happen in completion order; consumers that need the stream in
/// sequence read the scratch files in ascending index order instead.
pub struct SegmentPool {
    fetcher: Arc<dyn SegmentFetcher>,
    pub parallelism: usize,
    pub retry: RetryPolicy,
    /// Run `on_progress` under a single lock for callers that cannot
    /// tolerate concurrent invocation.
    pub serialize_progress: bool,
}

impl SegmentPool {
    pub fn new(fetcher: Arc<dyn SegmentFetcher>, parallelism: usize) -> Self {
        Self {
            fetcher,
            parallelism: parallelism.max(1),
            retry: RetryPolicy::default(),
            serialize_progress: false,
        }
    }

    /// Downloads every segment into `scratch_dir`.
    ///
    /// `on_progress(segment, done, total, scratch_file)` fires after each
    /// segment lands, in completion order, possibly concurrently.
    ///
    /// The scratch directory is owned by the caller; on failure the pool
    /// removes the segment files it wrote but leaves the directory alone.
    pub async fn download<F>(
        &self,
        segments: &[Segment],
        scratch_dir: &Path,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(&Segment, usize, usize, &Path) + Send + Sync,
    {
        if segments.is_empty() {
            return Ok(());
        }

        // Key material is fetched once per distinct key before any worker
        // starts; workers share the derived cipher immutably.
        let ciphers = self.derive_ciphers(segments).await?;

        let total = segments.len();
        let worker_cancel = cancel.child_token();
        let done = AtomicUsize::new(0);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let progress_lock: Mutex<()> = Mutex::new(());

        fn record(slot: &Mutex<Option<Error>>, err: Error) {
            let mut slot = slot.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }

        let workers = ranges(total, self.parallelism).into_iter().map(|(start, end)| {
            let worker_cancel = &worker_cancel;
            let ciphers = &ciphers;
            let done = &done;
            let first_error = &first_error;
            let progress_lock = &progress_lock;
            let on_progress = &on_progress;

            async move {
                for segment in &segments[start..end] {
                    if worker_cancel.is_cancelled() {
                        break;
                    }

                    let cipher = segment
                        .key
                        .as_ref()
                        .and_then(|k| ciphers.get(k))
                        .map(|c| c.as_ref());

                    let bytes = match fetch_segment(
                        self.fetcher.as_ref(),
                        segment,
                        cipher,
                        &self.retry,
                        worker_cancel,
                    )
                    .await
                    {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            if !err.is_cancelled() {
                                record(first_error, err);
                            }
                            worker_cancel.cancel();
                            break;
                        }
                    };

                    let path = scratch_dir.join(format!("{}.ts", segment.index));
                    if let Err(err) = tokio::fs::write(&path, &bytes).await {
                        record(first_error, err.into());
                        worker_cancel.cancel();
                        break;
                    }

                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("segment {} done ({}/{})", segment.index, finished, total);
                    if self.serialize_progress {
                        let _guard = progress_lock.lock();
                        on_progress(segment, finished, total, &path);
                    } else {
                        on_progress(segment, finished, total, &path);
                    }
                }
            }
        });

        join_all(workers).await;

        // The caller's cancellation wins over errors workers raced into
        // during teardown.
        if cancel.is_cancelled() {
            self.remove_scratch_files(segments, scratch_dir).await;
            return Err(Error::Cancelled);
        }
        if let Some(err) = first_error.into_inner() {
            self.remove_scratch_files(segments, scratch_dir).await;
            return Err(err);
        }

        Ok(())
    }

    async fn derive_ciphers(
        &self,
        segments: &[Segment],
    ) -> Result<HashMap<SegmentKey, Arc<SegmentCipher>>> {
        let mut ciphers = HashMap::new();
        for segment in segments {
            let Some(key) = &segment.key else { continue };
            if ciphers.contains_key(key) {
                continue;
            }
            let raw = self.fetcher.fetch_raw(&key.url).await?;
            ciphers.insert(
                key.clone(),
                Arc::new(SegmentCipher::from_key_bytes(&raw, key.iv)?),
            );
        }
        Ok(ciphers)
    }

    async fn remove_scratch_files(&self, segments: &[Segment], scratch_dir: &Path) {
        for segment in segments {
            let _ = tokio::fs::remove_file(scratch_dir.join(format!("{}.ts", segment.index))).await;
        }
    }
}

/// Splits `0..total` into at most `workers` contiguous ranges of `⌈N/W⌉`
/// segments. Each worker walks a sequential prefix of its range, which keeps
/// file writes mostly local and resumption simple.
fn ranges(total: usize, workers: usize) -> Vec<(usize, usize)> {
    let chunk = total.div_ceil(workers.max(1));
    (0..workers)
        .map(|i| (i * chunk, ((i + 1) * chunk).min(total)))
        .filter(|(start, end)| start < end)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::hls::fetcher::tests::encrypt;

    /// In-memory fetcher with optional always-failing urls, a per-call delay
    /// and a high-water mark of concurrent calls.
    struct MapFetcher {
        responses: HashMap<String, Vec<u8>>,
        failing: Vec<String>,
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MapFetcher {
        fn new(responses: HashMap<String, Vec<u8>>) -> Self {
            Self {
                responses,
                failing: vec![],
                delay: Duration::from_millis(10),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SegmentFetcher for MapFetcher {
        async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|f| f == url) {
                return Err(Error::Network("injected failure".into()));
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Network(format!("no response for {}", url)))
        }
    }

    fn plain_segments(count: usize) -> (Vec<Segment>, HashMap<String, Vec<u8>>) {
        let mut responses = HashMap::new();
        let segments = (0..count)
            .map(|i| {
                let url = format!("https://cdn.example.tv/{}.ts", i);
                responses.insert(url.clone(), format!("segment-{}", i).into_bytes());
                Segment {
                    index: i,
                    url,
                    key: None,
                }
            })
            .collect();
        (segments, responses)
    }

    #[test]
    fn ranges_are_contiguous_and_cover_everything() {
        for (total, workers) in [(10, 3), (1, 8), (500, 4), (7, 7), (16, 4)] {
            let r = ranges(total, workers);
            assert!(r.len() <= workers);
            assert_eq!(r[0].0, 0);
            assert_eq!(r.last().unwrap().1, total);
            for pair in r.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn downloads_all_segments_and_reports_progress() {
        let (segments, responses) = plain_segments(10);
        let scratch = tempfile::tempdir().unwrap();
        let pool = SegmentPool::new(Arc::new(MapFetcher::new(responses)), 3);

        let calls = AtomicUsize::new(0);
        pool.download(&segments, scratch.path(), &CancellationToken::new(), |_, _, total, _| {
            assert_eq!(total, 10);
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        for i in 0..10 {
            let body = std::fs::read(scratch.path().join(format!("{}.ts", i))).unwrap();
            assert_eq!(body, format!("segment-{}", i).into_bytes());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn decrypts_with_key_from_playlist() {
        let key_bytes = [5u8; 16];
        let iv = [6u8; 16];
        let mut responses = HashMap::new();
        responses.insert("https://cdn.example.tv/key".to_string(), key_bytes.to_vec());

        let segments: Vec<Segment> = (0..4)
            .map(|i| {
                let url = format!("https://cdn.example.tv/{}.ts", i);
                responses.insert(
                    url.clone(),
                    encrypt(&key_bytes, &iv, format!("clear-{}", i).as_bytes()),
                );
                Segment {
                    index: i,
                    url,
                    key: Some(SegmentKey {
                        url: "https://cdn.example.tv/key".into(),
                        iv: Some(iv),
                    }),
                }
            })
            .collect();

        let scratch = tempfile::tempdir().unwrap();
        let pool = SegmentPool::new(Arc::new(MapFetcher::new(responses)), 2);
        pool.download(&segments, scratch.path(), &CancellationToken::new(), |_, _, _, _| {})
            .await
            .unwrap();

        for i in 0..4 {
            let body = std::fs::read(scratch.path().join(format!("{}.ts", i))).unwrap();
            assert_eq!(body, format!("clear-{}", i).into_bytes());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_segment_cancels_siblings_and_cleans_up() {
        let (segments, responses) = plain_segments(20);
        let mut fetcher = MapFetcher::new(responses);
        fetcher.failing.push("https://cdn.example.tv/5.ts".into());

        let scratch = tempfile::tempdir().unwrap();
        let pool = SegmentPool::new(Arc::new(fetcher), 4);

        let err = pool
            .download(&segments, scratch.path(), &CancellationToken::new(), |_, _, _, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(_)));
        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0, "scratch files must be removed on failure");
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_wins_over_worker_errors() {
        let (segments, responses) = plain_segments(100);
        let scratch = tempfile::tempdir().unwrap();
        let pool = SegmentPool::new(Arc::new(MapFetcher::new(responses)), 2);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            trigger.cancel();
        });

        let err = pool
            .download(&segments, scratch.path(), &cancel, |_, _, _, _| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn serialized_progress_never_overlaps() {
        let (segments, responses) = plain_segments(16);
        let scratch = tempfile::tempdir().unwrap();
        let mut pool = SegmentPool::new(Arc::new(MapFetcher::new(responses)), 4);
        pool.serialize_progress = true;

        let inside = AtomicUsize::new(0);
        let overlapped = AtomicUsize::new(0);
        pool.download(&segments, scratch.path(), &CancellationToken::new(), |_, _, _, _| {
            if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.fetch_add(1, Ordering::SeqCst);
            }
            inside.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(overlapped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn parallelism_bounds_concurrent_fetches() {
        let (segments, responses) = plain_segments(64);
        let fetcher = Arc::new(MapFetcher::new(responses));
        let scratch = tempfile::tempdir().unwrap();
        let pool = SegmentPool::new(fetcher.clone(), 4);

        pool.download(&segments, scratch.path(), &CancellationToken::new(), |_, _, _, _| {})
            .await
            .unwrap();

        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 4);
    }
}
