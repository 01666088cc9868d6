use crate::dataset::Dataset;
use crate::error::{Result, SiftError};
use crate::feature::{Feature, FeatureValue};
use crate::table::FeatureTable;
use ahash::AHashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default cap on concurrently running extraction tasks
pub const DEFAULT_MAX_IN_FLIGHT: usize = 30;

/// Default capacity of the result queue between workers and the aggregator
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Maximum number of extraction tasks in flight at once
    pub max_in_flight: usize,

    /// Bounded result-queue capacity (backpressure on fast workers)
    pub queue_capacity: usize,

    /// Turn the first per-task failure into a run-level error
    pub fail_fast: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fail_fast: false,
        }
    }
}

/// A task whose extraction failed; the entry stays visible in the table
/// with the feature absent, never as a fabricated zero
#[derive(Debug)]
pub struct ExtractionFailure {
    pub hash: String,
    pub feature: Feature,
    pub error: String,
}

/// Result of a scheduler run
#[derive(Debug)]
pub struct ExtractionReport {
    pub table: FeatureTable,
    pub failures: Vec<ExtractionFailure>,
    pub duration_secs: f64,
}

struct TaskResult {
    hash: String,
    feature: Feature,
    outcome: Result<FeatureValue>,
}

/// Fans the (object x feature) cartesian product out across a bounded pool
/// of workers and fans results back into a single table.
///
/// One task is dispatched per pair; a semaphore caps how many run at once
/// and a bounded queue carries results to a single aggregator task that
/// owns the table. Workers never touch the table. Termination is by
/// channel closure: the dispatcher drops the last sender only after every
/// worker has been joined, and the aggregator exits only when the closed
/// queue is fully drained, so the last result is always merged.
pub struct ExtractionScheduler {
    config: ExtractConfig,
}

impl Default for ExtractionScheduler {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

impl ExtractionScheduler {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Extract every requested feature from every object in the dataset.
    /// Suspends until all dispatched work has been merged. The resulting
    /// table holds one entry per object with one value per requested
    /// feature plus LABEL.
    pub async fn run(&self, features: &[Feature], dataset: &Dataset) -> Result<ExtractionReport> {
        if features.is_empty() {
            return Err(SiftError::InvalidArgument(
                "no features requested".to_string(),
            ));
        }
        if features.contains(&Feature::Label) {
            return Err(SiftError::InvalidArgument(
                "LABEL is added by the aggregator and cannot be requested".to_string(),
            ));
        }
        if dataset.is_empty() {
            return Err(SiftError::InvalidArgument("empty dataset".to_string()));
        }

        let started = Instant::now();
        let labels_by_hash: Arc<AHashMap<String, Vec<String>>> = Arc::new(
            dataset
                .objects()
                .map(|object| (object.hash().to_string(), object.labels().to_vec()))
                .collect(),
        );

        let (sender, mut receiver) = mpsc::channel::<TaskResult>(self.config.queue_capacity);
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));

        let aggregator_labels = Arc::clone(&labels_by_hash);
        let aggregator = tokio::spawn(async move {
            let mut table = FeatureTable::new();
            let mut failures = Vec::new();
            while let Some(result) = receiver.recv().await {
                let labels = aggregator_labels
                    .get(&result.hash)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                table.seed(&result.hash, labels);
                match result.outcome {
                    Ok(value) => {
                        if table.insert(&result.hash, result.feature, value) {
                            debug!(hash = %result.hash, feature = %result.feature, "merged result");
                        } else {
                            warn!(
                                hash = %result.hash,
                                feature = %result.feature,
                                "duplicate result for pair, keeping first"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(
                            hash = %result.hash,
                            feature = %result.feature,
                            error = %err,
                            "extraction task failed"
                        );
                        failures.push(ExtractionFailure {
                            hash: result.hash,
                            feature: result.feature,
                            error: err.to_string(),
                        });
                    }
                }
            }
            (table, failures)
        });

        let mut workers = JoinSet::new();
        for object in dataset.objects() {
            let hash = object.hash().to_string();
            let data = object.share_data();
            for &feature in features {
                let semaphore = Arc::clone(&semaphore);
                let sender = sender.clone();
                let hash = hash.clone();
                let data = Arc::clone(&data);
                workers.spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            match tokio::task::spawn_blocking(move || feature.extract(&data)).await
                            {
                                Ok(result) => result,
                                Err(err) => Err(SiftError::TaskFailure(err.to_string())),
                            }
                        }
                        Err(err) => Err(SiftError::TaskFailure(err.to_string())),
                    };
                    let _ = sender.send(TaskResult {
                        hash,
                        feature,
                        outcome,
                    }).await;
                });
            }
        }
        drop(sender);

        let mut join_errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                join_errors.push(err.to_string());
            }
        }

        let (table, failures) = aggregator
            .await
            .map_err(|err| SiftError::TaskFailure(format!("aggregator died: {err}")))?;

        if !join_errors.is_empty() {
            return Err(SiftError::TaskFailure(join_errors.join("; ")));
        }
        if self.config.fail_fast {
            if let Some(failure) = failures.first() {
                return Err(SiftError::TaskFailure(format!(
                    "{} on {}: {}",
                    failure.feature, failure.hash, failure.error
                )));
            }
        }

        Ok(ExtractionReport {
            table,
            failures,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }
}
