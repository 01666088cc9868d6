//! Content-addressed byte-statistics extraction for binary sample
//! classification
//!
//! This library provides the feature-extraction pipeline behind the
//! bytesift tool:
//! - Content-addressed datasets deduplicated by SHA-256
//! - Pure byte-level statistics (frequency distributions, moments,
//!   streaks, Shannon entropy)
//! - A bounded-concurrency scheduler fanning (object x feature) work out
//!   across tokio tasks and draining results through a single aggregator
//! - A lossless JSON codec for feature tables, with dense expansion and
//!   L2-normalized matrix flattening for external classifiers

pub mod cli;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod feature;
pub mod object;
pub mod stats;
pub mod table;

// Re-export commonly used types
pub use dataset::{Dataset, LoadFailure, LoadReport};
pub use error::{Result, SiftError};
pub use extract::{
    ExtractConfig, ExtractionFailure, ExtractionReport, ExtractionScheduler, DEFAULT_MAX_IN_FLIGHT,
};
pub use feature::{DenseDomain, Feature, FeatureValue, ValueKind, EXTRACTABLE};
pub use object::{BinaryObject, Segments};
pub use stats::{
    avg_byte_continuity, byte_frequency, byte_std_dev, high_ascii_frequency, longest_byte_streak,
    low_ascii_frequency, mean_absolute_deviation, mean_byte_value, shannon_entropy, std_kurtosis,
    std_skewness, word_frequency,
};
pub use table::{FeatureEntry, FeatureMatrix, FeatureTable};
