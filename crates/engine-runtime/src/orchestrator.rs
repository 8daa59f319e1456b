//! Retryable, single-flight wrapper around [`PipelineRunner`].

use crate::{error::PipelineError, options::RunOptions, runner::PipelineRunner};
use engine_core::retry::{RetryError, RetryPolicy};
use model::summary::LoadSummary;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Orchestrator {
    runner: Arc<PipelineRunner>,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
    flights: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(runner: Arc<PipelineRunner>, timeout: Duration, cancel: CancellationToken) -> Self {
        Orchestrator {
            runner,
            policy: RetryPolicy::for_runs(),
            timeout,
            cancel,
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    /// Runs one source, retrying transient failures with backoff.
    ///
    /// At most one run per `(source, partition)` is in flight; a second caller
    /// waits for the first to finish. Each attempt is bounded by the timeout
    /// and resumes from the last committed cursor.
    pub async fn run(&self, source: &str, options: &RunOptions) -> Result<LoadSummary, PipelineError> {
        let flight = self.flight(source, &options.partition).await;
        let _guard = match flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!(source = %source, partition = %options.partition, "Another run is in flight, waiting");
                flight.lock().await
            }
        };

        let attempts = AtomicUsize::new(0);
        let retried = self.policy.run(
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt > 1 {
                        info!(source = %source, attempt, "Retrying pipeline run");
                    }
                    self.attempt(source, options).await
                }
            },
            |err: &PipelineError| err.disposition(),
        );

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(RetryError::Fatal(PipelineError::Cancelled)),
            result = retried => result,
        };

        result.map_err(|err| match err {
            RetryError::Fatal(err) => err,
            RetryError::AttemptsExceeded(err) => {
                warn!(
                    source = %source,
                    attempts = attempts.load(Ordering::SeqCst),
                    error = %err,
                    "Giving up after repeated transient failures"
                );
                err
            }
        })
    }

    /// Runs several sources one after another. Every source is attempted
    /// even when an earlier one fails, unless the run is cancelled.
    pub async fn sync(
        &self,
        sources: &[String],
        options: &RunOptions,
    ) -> Vec<(String, Result<LoadSummary, PipelineError>)> {
        let mut results = Vec::with_capacity(sources.len());
        for (idx, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(remaining = sources.len() - idx, "Shutdown requested, skipping remaining sources");
                break;
            }
            info!(source = %source, "Syncing source {}/{}", idx + 1, sources.len());
            let result = self.run(source, options).await;
            results.push((source.clone(), result));
        }
        results
    }

    async fn attempt(&self, source: &str, options: &RunOptions) -> Result<LoadSummary, PipelineError> {
        match tokio::time::timeout(self.timeout, self.runner.run(source, options, &self.cancel)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(source = %source, timeout_secs = self.timeout.as_secs(), "Pipeline run timed out");
                Err(PipelineError::Timeout(self.timeout))
            }
        }
    }

    async fn flight(&self, source: &str, partition: &str) -> Arc<Mutex<()>> {
        self.flights
            .lock()
            .await
            .entry((source.to_string(), partition.to_string()))
            .or_default()
            .clone()
    }
}
