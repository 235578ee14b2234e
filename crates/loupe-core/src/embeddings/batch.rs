//! Batch Embedding Processor
//!
//! Drives an `Embedder` over large item sets with:
//! - batching and bounded concurrency
//! - token-bucket rate limiting on batch starts
//! - per-batch retry with exponential backoff, failures isolated
//! - cancellation via a shared flag, returning partial results
//! - content-addressed cache dedup and progress callbacks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{EmbedError, Embedder, EmbeddingCache, InputType};
use crate::model::ContentKind;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Batch processor configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items per embedding call
    pub batch_size: usize,
    /// Batches in flight at once
    pub concurrency: usize,
    /// Retries per batch before marking its items failed
    pub max_retries: u32,
    /// Base backoff; attempt N sleeps `retry_delay_ms * 2^N`
    pub retry_delay_ms: u64,
    /// Token-bucket limit on batch starts
    pub max_batches_per_second: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 4,
            max_retries: 3,
            retry_delay_ms: 200,
            max_batches_per_second: 8,
        }
    }
}

/// One unit of embeddable content
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
    pub granularity: ContentKind,
}

/// Progress snapshot delivered to the callback after every batch
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub status: &'static str,
}

/// Final outcome; `vectors` preserves input order with failed items omitted
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub vectors: Vec<(String, ContentKind, Vec<f32>)>,
    pub failed: usize,
    pub cache_hits: usize,
}

/// Progress callback type
pub type ProgressFn = Arc<dyn Fn(BatchProgress) + Send + Sync>;

// ============================================================================
// RATE LIMITER
// ============================================================================

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_second: u32) -> Self {
        let capacity = per_second.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Take a token or report how long until one is available
    fn try_take(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec))
        }
    }
}

async fn acquire(bucket: &Mutex<TokenBucket>) {
    loop {
        // Lock never held across a suspension point
        let wait = match bucket.lock() {
            Ok(mut b) => b.try_take(),
            Err(_) => None,
        };
        match wait {
            None => return,
            Some(d) => tokio::time::sleep(d).await,
        }
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Batch processor over a shared embedder and cache
pub struct BatchProcessor {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, config: BatchConfig) -> Self {
        Self {
            embedder,
            cache,
            config,
        }
    }

    /// Embed all items, returning vectors in input order.
    ///
    /// Failures are isolated per batch: a permanently failing batch
    /// marks only its own items failed. Setting `cancel` causes
    /// in-flight work to abandon at the next suspension point; the
    /// partial result accounts the remainder under `failed`.
    pub async fn process(
        &self,
        items: Vec<BatchItem>,
        cancel: Arc<AtomicBool>,
        progress: Option<ProgressFn>,
    ) -> BatchOutput {
        let total = items.len();
        let mut resolved: Vec<Option<Vec<f32>>> = vec![None; total];

        // Cache pass: content-addressed keys collapse duplicates
        let mut pending: Vec<usize> = Vec::new();
        let mut cache_hits = 0;
        for (idx, item) in items.iter().enumerate() {
            match self.cache.get(&item.text, InputType::Document) {
                Some(vector) => {
                    resolved[idx] = Some(vector);
                    cache_hits += 1;
                }
                None => pending.push(idx),
            }
        }

        let report = |processed: usize, failed: usize, status: &'static str| {
            if let Some(cb) = &progress {
                cb(BatchProgress {
                    total,
                    processed,
                    failed,
                    status,
                });
            }
        };
        report(cache_hits, 0, "started");

        let batches: Vec<Vec<usize>> = pending
            .chunks(self.config.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let limiter = Arc::new(Mutex::new(TokenBucket::new(self.config.max_batches_per_second)));
        let mut join_set: JoinSet<(Vec<usize>, Result<Vec<Vec<f32>>, EmbedError>)> = JoinSet::new();

        for batch in batches {
            let texts: Vec<String> = batch.iter().map(|&i| items[i].text.clone()).collect();
            let embedder = Arc::clone(&self.embedder);
            let semaphore = Arc::clone(&semaphore);
            let limiter = Arc::clone(&limiter);
            let cancel = Arc::clone(&cancel);
            let max_retries = self.config.max_retries;
            let retry_delay_ms = self.config.retry_delay_ms;

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        return (batch, Err(EmbedError::EmbeddingFailed("semaphore closed".into())))
                    }
                };
                acquire(&limiter).await;

                let mut attempt = 0;
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        return (batch, Err(EmbedError::EmbeddingFailed("cancelled".into())));
                    }
                    match embedder.embed_batch(&texts, InputType::Document).await {
                        Ok(vectors) => return (batch, Ok(vectors)),
                        Err(e) if attempt < max_retries => {
                            let delay = retry_delay_ms.saturating_mul(1 << attempt);
                            tracing::debug!(
                                "Embedding batch failed (attempt {}), retrying in {}ms: {}",
                                attempt,
                                delay,
                                e
                            );
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            attempt += 1;
                        }
                        Err(e) => return (batch, Err(e)),
                    }
                }
            });
        }

        let mut processed = cache_hits;
        let mut failed = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((batch, Ok(vectors))) => {
                    for (slot, vector) in batch.iter().zip(vectors) {
                        self.cache
                            .put(&items[*slot].text, InputType::Document, vector.clone());
                        resolved[*slot] = Some(vector);
                    }
                    processed += batch.len();
                    report(processed, failed, "embedding");
                }
                Ok((batch, Err(e))) => {
                    tracing::warn!("Embedding batch permanently failed ({} items): {}", batch.len(), e);
                    failed += batch.len();
                    report(processed, failed, "embedding");
                }
                Err(e) => {
                    tracing::warn!("Embedding task panicked: {}", e);
                }
            }
        }

        report(processed, failed, "done");

        let mut vectors = Vec::with_capacity(total - failed);
        for (idx, slot) in resolved.into_iter().enumerate() {
            if let Some(vector) = slot {
                let item = &items[idx];
                vectors.push((item.id.clone(), item.granularity, vector));
            }
        }

        BatchOutput {
            vectors,
            failed,
            cache_hits,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn items(names: &[&str]) -> Vec<BatchItem> {
        names
            .iter()
            .map(|n| BatchItem {
                id: format!("id-{}", n),
                text: n.to_string(),
                granularity: ContentKind::Symbol,
            })
            .collect()
    }

    fn processor(embedder: Arc<dyn Embedder>, config: BatchConfig) -> BatchProcessor {
        BatchProcessor::new(embedder, Arc::new(EmbeddingCache::new(100)), config)
    }

    /// Fails the first `failures` embed calls, then succeeds
    struct FlakyEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn model_id(&self) -> &str {
            "flaky"
        }
        async fn embed(&self, text: &str, input_type: InputType) -> Result<Vec<f32>, EmbedError> {
            self.inner.embed(text, input_type).await
        }
        async fn embed_batch(
            &self,
            texts: &[String],
            input_type: InputType,
        ) -> Result<Vec<Vec<f32>>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EmbedError::EmbeddingFailed("transient".into()));
            }
            self.inner.embed_batch(texts, input_type).await
        }
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let processor = processor(Arc::new(HashEmbedder::new(32)), BatchConfig {
            batch_size: 2,
            ..Default::default()
        });
        let input = items(&["a", "b", "c", "d", "e"]);
        let out = processor
            .process(input.clone(), Arc::new(AtomicBool::new(false)), None)
            .await;

        assert_eq!(out.failed, 0);
        let ids: Vec<&str> = out.vectors.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["id-a", "id-b", "id-c", "id-d", "id-e"]);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(32),
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let processor = processor(embedder, BatchConfig {
            batch_size: 10,
            max_retries: 3,
            retry_delay_ms: 1,
            ..Default::default()
        });
        let out = processor
            .process(items(&["a", "b"]), Arc::new(AtomicBool::new(false)), None)
            .await;
        assert_eq!(out.failed, 0);
        assert_eq!(out.vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_isolated() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(32),
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let processor = processor(embedder, BatchConfig {
            batch_size: 2,
            max_retries: 1,
            retry_delay_ms: 1,
            concurrency: 1,
            ..Default::default()
        });
        let out = processor
            .process(items(&["a", "b", "c"]), Arc::new(AtomicBool::new(false)), None)
            .await;
        assert_eq!(out.failed, 3);
        assert!(out.vectors.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial() {
        let processor = processor(Arc::new(HashEmbedder::new(32)), BatchConfig::default());
        let cancel = Arc::new(AtomicBool::new(true));
        let out = processor.process(items(&["a", "b", "c"]), cancel, None).await;
        assert_eq!(out.failed, 3);
        assert!(out.vectors.is_empty());
    }

    #[tokio::test]
    async fn test_cache_collapses_duplicates() {
        let cache = Arc::new(EmbeddingCache::new(100));
        let processor = BatchProcessor::new(
            Arc::new(HashEmbedder::new(32)),
            Arc::clone(&cache),
            BatchConfig::default(),
        );

        let first = processor
            .process(items(&["same", "other"]), Arc::new(AtomicBool::new(false)), None)
            .await;
        assert_eq!(first.cache_hits, 0);

        let second = processor
            .process(items(&["same"]), Arc::new(AtomicBool::new(false)), None)
            .await;
        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.vectors.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_terminal_state() {
        let processor = processor(Arc::new(HashEmbedder::new(32)), BatchConfig::default());
        let seen: Arc<Mutex<Vec<BatchProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let out = processor
            .process(
                items(&["a", "b"]),
                Arc::new(AtomicBool::new(false)),
                Some(Arc::new(move |p| sink.lock().unwrap().push(p))),
            )
            .await;
        assert_eq!(out.failed, 0);

        let reports = seen.lock().unwrap();
        let last = reports.last().unwrap();
        assert_eq!(last.status, "done");
        assert_eq!(last.processed, 2);
    }
}
