use crate::error::{Result, SiftError};
use crate::feature::{DenseDomain, Feature, FeatureValue};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// The per-object feature map inside a table
pub type FeatureEntry = BTreeMap<Feature, FeatureValue>;

/// Feature values keyed by content hash, one entry per object.
///
/// Entries are created pre-seeded with the object's LABEL value; every
/// other `(hash, feature)` slot is written exactly once, by the extraction
/// task that owns the pair. Iteration is ascending by hash, so flattened
/// matrices are deterministic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureTable {
    entries: BTreeMap<String, FeatureEntry>,
}

/// Flattened numeric form of a table: one L2-normalized row per object,
/// a parallel vector carrying each object's first label (the documented
/// multi-label collapse) and a parallel vector of row hashes preserving
/// identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    pub hashes: Vec<String>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&FeatureEntry> {
        self.entries.get(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureEntry)> {
        self.entries.iter()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Get the entry for a hash, creating it pre-seeded with LABEL when
    /// absent
    pub fn seed(&mut self, hash: &str, labels: &[String]) -> &mut FeatureEntry {
        self.entries.entry(hash.to_string()).or_insert_with(|| {
            let mut entry = FeatureEntry::new();
            entry.insert(Feature::Label, FeatureValue::Labels(labels.to_vec()));
            entry
        })
    }

    /// Insert a value for a `(hash, feature)` pair. Returns false if the
    /// slot was already occupied (the write-once invariant was violated by
    /// the caller; the original value is kept).
    pub fn insert(&mut self, hash: &str, feature: Feature, value: FeatureValue) -> bool {
        let entry = self.entries.entry(hash.to_string()).or_default();
        if entry.contains_key(&feature) {
            return false;
        }
        entry.insert(feature, value);
        true
    }

    /// Serialize to the persisted JSON document:
    /// `{ "<hash>": { "<FEATURE_NAME>": <value>, ... }, ... }`
    pub fn serialize(&self) -> Result<String> {
        let mut document = serde_json::Map::new();
        for (hash, entry) in &self.entries {
            let mut object = serde_json::Map::new();
            for (feature, value) in entry {
                let json = serde_json::to_value(value)
                    .map_err(|err| SiftError::CorruptData(err.to_string()))?;
                object.insert(feature.name().to_string(), json);
            }
            document.insert(hash.clone(), serde_json::Value::Object(object));
        }
        serde_json::to_string(&serde_json::Value::Object(document))
            .map_err(|err| SiftError::CorruptData(err.to_string()))
    }

    /// Rebuild a table from its persisted form. Feature keys are restored
    /// from their serialized names; unknown names and shape mismatches are
    /// typed errors, fatal to the load.
    pub fn deserialize(text: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| SiftError::CorruptData(format!("not valid JSON: {err}")))?;
        let root = document
            .as_object()
            .ok_or_else(|| SiftError::CorruptData("top-level value is not an object".to_string()))?;

        let mut table = FeatureTable::new();
        for (hash, entry_value) in root {
            let object = entry_value.as_object().ok_or_else(|| {
                SiftError::CorruptData(format!("entry {hash} is not an object"))
            })?;
            let entry = table.entries.entry(hash.clone()).or_default();
            for (name, value) in object {
                let feature = Feature::from_str(name)?;
                let parsed = FeatureValue::from_json(feature.kind(), value)?;
                entry.insert(feature, parsed);
            }
        }
        Ok(table)
    }

    /// Save atomically: write a sibling tmp file, sync, then rename over
    /// the destination so readers never observe a partial document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = self.serialize()?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(serialized.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::deserialize(&text)
    }

    /// Flatten into a numeric matrix. Each requested feature contributes,
    /// in order: its scalar (one column), its run as a (byte, length) pair
    /// (two columns), or its distribution expanded over the feature's full
    /// dense domain in ascending key order, zero-filled where absent (keys
    /// outside the domain are dropped). Rows are L2-normalized; an entry
    /// missing a requested feature is an error, so a failed extraction can
    /// never read as a row of zeros.
    pub fn to_matrix(&self, features: &[Feature]) -> Result<FeatureMatrix> {
        if features.is_empty() {
            return Err(SiftError::InvalidArgument(
                "feature order must not be empty".to_string(),
            ));
        }
        if features.contains(&Feature::Label) {
            return Err(SiftError::InvalidArgument(
                "LABEL is carried in the label vector, not the matrix".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(self.entries.len());
        let mut labels = Vec::with_capacity(self.entries.len());
        let mut hashes = Vec::with_capacity(self.entries.len());

        for (hash, entry) in &self.entries {
            let mut row = Vec::new();
            for feature in features {
                let value = entry.get(feature).ok_or_else(|| SiftError::MissingFeature {
                    hash: hash.clone(),
                    feature: feature.name().to_string(),
                })?;
                if value.kind() != feature.kind() {
                    return Err(SiftError::CorruptData(format!(
                        "entry {hash} holds a {:?} value under {feature}",
                        value.kind()
                    )));
                }
                match value {
                    FeatureValue::Scalar(scalar) => row.push(*scalar),
                    FeatureValue::Run(byte, length) => {
                        row.push(f64::from(*byte));
                        row.push(*length as f64);
                    }
                    FeatureValue::Distribution(dist) => {
                        let domain = feature.dense_domain().ok_or_else(|| {
                            SiftError::CorruptData(format!("{feature} has no dense domain"))
                        })?;
                        expand_distribution(dist, domain, &mut row);
                    }
                    FeatureValue::Labels(_) => unreachable!("kind checked above"),
                }
            }
            let label = match entry.get(&Feature::Label) {
                Some(FeatureValue::Labels(list)) => list.first().cloned().unwrap_or_default(),
                _ => String::new(),
            };
            rows.push(row);
            labels.push(label);
            hashes.push(hash.clone());
        }

        rows.par_iter_mut().for_each(|row| {
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for value in row.iter_mut() {
                    *value /= norm;
                }
            }
        });

        Ok(FeatureMatrix {
            rows,
            labels,
            hashes,
        })
    }

    /// Partition rows into training and test tables. `round(fraction * N)`
    /// shuffled rows go to the training table, the rest to the test table;
    /// the shuffle is seeded, so a given (table, fraction, seed) always
    /// produces the same partition.
    pub fn split_train_test(&self, fraction: f64, seed: u64) -> Result<(FeatureTable, FeatureTable)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(SiftError::InvalidRatio(fraction));
        }

        let mut hashes: Vec<&String> = self.entries.keys().collect();
        let mut rng = StdRng::seed_from_u64(seed);
        hashes.shuffle(&mut rng);

        let train_count = ((fraction * hashes.len() as f64).round() as usize).min(hashes.len());
        let mut train = FeatureTable::new();
        let mut test = FeatureTable::new();
        for (index, hash) in hashes.iter().enumerate() {
            let entry = self.entries[*hash].clone();
            let target = if index < train_count { &mut train } else { &mut test };
            target.entries.insert((*hash).clone(), entry);
        }
        Ok((train, test))
    }
}

fn expand_distribution(dist: &BTreeMap<u16, u64>, domain: DenseDomain, row: &mut Vec<f64>) {
    let start = row.len();
    row.resize(start + domain.width, 0.0);
    for (&key, &count) in dist {
        if let Some(index) = (key as usize).checked_sub(domain.offset as usize) {
            if index < domain.width {
                row[start + index] = count as f64;
            }
        }
    }
}
