use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{RetryPolicy, ValidationItem, ValidationResponse, Validator, ValidatorError};
use crate::config::ValidatorConfig;

/// Outcome of sending a set of items, batch by batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub responses: HashMap<String, ValidationResponse>,
    /// Items with no usable answer; they keep their pre-escalation state.
    pub failed: Vec<String>,
    /// Validator invocations, retries included.
    pub calls: usize,
}

/// Sends items in batches with bounded concurrency, a per-call timeout and
/// retries on transient failures.
///
/// The semaphore can be shared between executors so the in-flight bound holds
/// across every document of a run.
#[derive(Clone)]
pub struct BatchExecutor {
    validator: Arc<dyn Validator>,
    semaphore: Arc<Semaphore>,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl BatchExecutor {
    #[must_use]
    pub fn new(validator: Arc<dyn Validator>, config: &ValidatorConfig) -> Self {
        Self {
            validator,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            retry: RetryPolicy::from_config(config),
        }
    }

    #[must_use]
    pub fn with_semaphore(mut self, semaphore: Arc<Semaphore>) -> Self {
        self.semaphore = semaphore;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    pub async fn run(&self, items: Vec<ValidationItem>) -> BatchResult {
        if items.is_empty() {
            return BatchResult::default();
        }

        let expected: BTreeSet<String> = items.iter().map(|i| i.id.clone()).collect();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        let mut items = items;
        while !items.is_empty() {
            let rest = items.split_off(self.batch_size.min(items.len()));
            let batch = Arc::new(std::mem::replace(&mut items, rest));

            let validator = Arc::clone(&self.validator);
            let semaphore = Arc::clone(&self.semaphore);
            let retry = self.retry.clone();
            let timeout = self.timeout;
            let calls = Arc::clone(&calls);

            tasks.spawn(async move {
                let size = batch.len();
                let result = retry
                    .retry("validate_batch", || {
                        let validator = Arc::clone(&validator);
                        let semaphore = Arc::clone(&semaphore);
                        let batch = Arc::clone(&batch);
                        let calls = Arc::clone(&calls);
                        async move {
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .map_err(|_| ValidatorError::Unavailable)?;
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::timeout(timeout, validator.validate(&batch))
                                .await
                                .map_err(|_| ValidatorError::Timeout(timeout))?
                        }
                    })
                    .await;
                (size, result)
            });
        }

        let mut responses = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(batch_responses))) => {
                    for response in batch_responses {
                        if expected.contains(&response.id) {
                            responses.entry(response.id.clone()).or_insert(response);
                        } else {
                            tracing::debug!(
                                rule = "unknown_response_id",
                                item = %response.id,
                                "Ignoring validator response"
                            );
                        }
                    }
                }
                Ok((size, Err(e))) => {
                    tracing::warn!(
                        rule = "validator_fallback",
                        validator = %self.validator.name(),
                        items = size,
                        error = %e,
                        "Batch left unvalidated"
                    );
                }
                Err(e) => {
                    tracing::error!(rule = "validator_task_failed", error = %e, "Batch task failed");
                }
            }
        }

        let failed: Vec<String> = expected
            .into_iter()
            .filter(|id| !responses.contains_key(id))
            .collect();
        for id in &failed {
            tracing::debug!(rule = "keep_pre_escalation", item = %id, "No validator verdict");
        }

        BatchResult {
            responses,
            failed,
            calls: calls.load(Ordering::SeqCst),
        }
    }
}
