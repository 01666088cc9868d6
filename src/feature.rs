use crate::error::{Result, SiftError};
use crate::stats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed catalog of extractable statistics, plus the reserved LABEL entry
/// that carries an object's labels through the feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Bfd,
    Wfd,
    ByteValMean,
    ByteValStdDev,
    ByteValMad,
    LowAsciiFreq,
    HighAsciiFreq,
    StdKurtosis,
    StdSkewness,
    AvgByteContinuity,
    LongestStreak,
    ShannonEntropy,
    Label,
}

/// Every extractable feature, in catalog order (LABEL excluded)
pub const EXTRACTABLE: [Feature; 12] = [
    Feature::Bfd,
    Feature::Wfd,
    Feature::ByteValMean,
    Feature::ByteValStdDev,
    Feature::ByteValMad,
    Feature::LowAsciiFreq,
    Feature::HighAsciiFreq,
    Feature::StdKurtosis,
    Feature::StdSkewness,
    Feature::AvgByteContinuity,
    Feature::LongestStreak,
    Feature::ShannonEntropy,
];

/// The shape of a feature's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Distribution,
    Run,
    Labels,
}

/// Fixed-length expansion domain of a distribution feature
#[derive(Debug, Clone, Copy)]
pub struct DenseDomain {
    /// Smallest key in the domain; dense index = key - offset
    pub offset: u16,
    /// Number of dense slots
    pub width: usize,
}

impl Feature {
    /// Serialized name, also the persisted-file key
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Bfd => "BFD",
            Feature::Wfd => "WFD",
            Feature::ByteValMean => "BYTE_VAL_MEAN",
            Feature::ByteValStdDev => "BYTE_VAL_STDDEV",
            Feature::ByteValMad => "BYTE_VAL_MAD",
            Feature::LowAsciiFreq => "LOW_ASCII_FREQ",
            Feature::HighAsciiFreq => "HIGH_ASCII_FREQ",
            Feature::StdKurtosis => "STD_KURTOSIS",
            Feature::StdSkewness => "STD_SKEWNESS",
            Feature::AvgByteContinuity => "AVG_BYTE_CONTINUITY",
            Feature::LongestStreak => "LONGEST_STREAK",
            Feature::ShannonEntropy => "SHANNON_ENTROPY",
            Feature::Label => "LABEL",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Feature::Bfd | Feature::Wfd | Feature::LowAsciiFreq | Feature::HighAsciiFreq => {
                ValueKind::Distribution
            }
            Feature::LongestStreak => ValueKind::Run,
            Feature::Label => ValueKind::Labels,
            _ => ValueKind::Scalar,
        }
    }

    /// Dense expansion domain for distribution features, None otherwise
    pub fn dense_domain(&self) -> Option<DenseDomain> {
        match self {
            Feature::Bfd => Some(DenseDomain {
                offset: 0,
                width: 256,
            }),
            Feature::Wfd => Some(DenseDomain {
                offset: 0,
                width: 65536,
            }),
            Feature::LowAsciiFreq => Some(DenseDomain {
                offset: 32,
                width: 95,
            }),
            Feature::HighAsciiFreq => Some(DenseDomain {
                offset: 128,
                width: 128,
            }),
            _ => None,
        }
    }

    /// Number of matrix columns this feature contributes
    pub fn column_width(&self) -> usize {
        match self.kind() {
            ValueKind::Scalar => 1,
            ValueKind::Run => 2,
            ValueKind::Distribution => self.dense_domain().map(|d| d.width).unwrap_or(0),
            ValueKind::Labels => 0,
        }
    }

    /// Compute this feature's value for a buffer. LABEL is not extracted
    /// from bytes; the aggregator assigns it from the object's label list.
    pub fn extract(&self, data: &[u8]) -> Result<FeatureValue> {
        let value = match self {
            Feature::Bfd => FeatureValue::Distribution(stats::byte_frequency(data)?),
            Feature::Wfd => FeatureValue::Distribution(stats::word_frequency(data)?),
            Feature::ByteValMean => FeatureValue::Scalar(stats::mean_byte_value(data)?),
            Feature::ByteValStdDev => FeatureValue::Scalar(stats::byte_std_dev(data)?),
            Feature::ByteValMad => FeatureValue::Scalar(stats::mean_absolute_deviation(data)?),
            Feature::LowAsciiFreq => FeatureValue::Distribution(stats::low_ascii_frequency(data)?),
            Feature::HighAsciiFreq => {
                FeatureValue::Distribution(stats::high_ascii_frequency(data)?)
            }
            Feature::StdKurtosis => FeatureValue::Scalar(stats::std_kurtosis(data)?),
            Feature::StdSkewness => FeatureValue::Scalar(stats::std_skewness(data)?),
            Feature::AvgByteContinuity => FeatureValue::Scalar(stats::avg_byte_continuity(data)?),
            Feature::LongestStreak => {
                let (byte, length) = stats::longest_byte_streak(data)?;
                FeatureValue::Run(byte, length)
            }
            Feature::ShannonEntropy => FeatureValue::Scalar(stats::shannon_entropy(data)?),
            Feature::Label => {
                return Err(SiftError::InvalidArgument(
                    "LABEL is assigned by the aggregator, not extracted".to_string(),
                ))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = SiftError;

    fn from_str(name: &str) -> Result<Self> {
        let feature = match name {
            "BFD" => Feature::Bfd,
            "WFD" => Feature::Wfd,
            "BYTE_VAL_MEAN" => Feature::ByteValMean,
            "BYTE_VAL_STDDEV" => Feature::ByteValStdDev,
            "BYTE_VAL_MAD" => Feature::ByteValMad,
            "LOW_ASCII_FREQ" => Feature::LowAsciiFreq,
            "HIGH_ASCII_FREQ" => Feature::HighAsciiFreq,
            "STD_KURTOSIS" => Feature::StdKurtosis,
            "STD_SKEWNESS" => Feature::StdSkewness,
            "AVG_BYTE_CONTINUITY" => Feature::AvgByteContinuity,
            "LONGEST_STREAK" => Feature::LongestStreak,
            "SHANNON_ENTROPY" => Feature::ShannonEntropy,
            "LABEL" => Feature::Label,
            other => return Err(SiftError::UnknownFeature(other.to_string())),
        };
        Ok(feature)
    }
}

/// A single extracted value, one variant per feature kind.
///
/// Serialization is by shape: scalars as numbers, distributions as sparse
/// key/count objects, runs as a `[byte, length]` pair, labels as a string
/// list. Deserialization is kind-directed (`from_json`) so a persisted
/// value that does not match its feature's shape is a `CorruptData` error
/// rather than a misparse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(f64),
    Distribution(BTreeMap<u16, u64>),
    Run(u8, u64),
    Labels(Vec<String>),
}

impl FeatureValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FeatureValue::Scalar(_) => ValueKind::Scalar,
            FeatureValue::Distribution(_) => ValueKind::Distribution,
            FeatureValue::Run(_, _) => ValueKind::Run,
            FeatureValue::Labels(_) => ValueKind::Labels,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FeatureValue::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&BTreeMap<u16, u64>> {
        match self {
            FeatureValue::Distribution(dist) => Some(dist),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            FeatureValue::Labels(labels) => Some(labels),
            _ => None,
        }
    }

    /// Parse a persisted JSON value, validating it against the expected kind
    pub fn from_json(kind: ValueKind, value: &serde_json::Value) -> Result<Self> {
        match kind {
            ValueKind::Scalar => value
                .as_f64()
                .map(FeatureValue::Scalar)
                .ok_or_else(|| corrupt("expected a numeric scalar", value)),
            ValueKind::Distribution => {
                let object = value
                    .as_object()
                    .ok_or_else(|| corrupt("expected a key/count object", value))?;
                let mut dist = BTreeMap::new();
                for (key, count) in object {
                    let key: u16 = key
                        .parse()
                        .map_err(|_| corrupt("non-numeric distribution key", value))?;
                    let count = count
                        .as_u64()
                        .ok_or_else(|| corrupt("non-integer distribution count", value))?;
                    dist.insert(key, count);
                }
                Ok(FeatureValue::Distribution(dist))
            }
            ValueKind::Run => {
                let pair = value
                    .as_array()
                    .filter(|items| items.len() == 2)
                    .ok_or_else(|| corrupt("expected a [byte, length] pair", value))?;
                let byte = pair[0]
                    .as_u64()
                    .filter(|&b| b <= u64::from(u8::MAX))
                    .ok_or_else(|| corrupt("run byte out of range", value))?;
                let length = pair[1]
                    .as_u64()
                    .ok_or_else(|| corrupt("non-integer run length", value))?;
                Ok(FeatureValue::Run(byte as u8, length))
            }
            ValueKind::Labels => {
                let items = value
                    .as_array()
                    .ok_or_else(|| corrupt("expected a label list", value))?;
                let labels = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| corrupt("non-string label", value))
                    })
                    .collect::<Result<Vec<String>>>()?;
                Ok(FeatureValue::Labels(labels))
            }
        }
    }
}

fn corrupt(reason: &str, value: &serde_json::Value) -> SiftError {
    let mut rendered = value.to_string();
    if rendered.len() > 64 {
        rendered.truncate(64);
        rendered.push_str("...");
    }
    SiftError::CorruptData(format!("{reason}: {rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for feature in EXTRACTABLE.iter().chain([Feature::Label].iter()) {
            let parsed: Feature = feature.name().parse().unwrap();
            assert_eq!(parsed, *feature);
        }
        assert!(matches!(
            "BYTE_MAGIC".parse::<Feature>(),
            Err(SiftError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_kinds_and_domains() {
        assert_eq!(Feature::Bfd.kind(), ValueKind::Distribution);
        assert_eq!(Feature::ShannonEntropy.kind(), ValueKind::Scalar);
        assert_eq!(Feature::LongestStreak.kind(), ValueKind::Run);
        assert_eq!(Feature::Label.kind(), ValueKind::Labels);

        let domain = Feature::LowAsciiFreq.dense_domain().unwrap();
        assert_eq!((domain.offset, domain.width), (32, 95));
        let domain = Feature::HighAsciiFreq.dense_domain().unwrap();
        assert_eq!((domain.offset, domain.width), (128, 128));
        assert!(Feature::ByteValMean.dense_domain().is_none());

        assert_eq!(Feature::Bfd.column_width(), 256);
        assert_eq!(Feature::LongestStreak.column_width(), 2);
        assert_eq!(Feature::StdKurtosis.column_width(), 1);
    }

    #[test]
    fn test_extract_dispatch() {
        let data = b"AABB12CCCC";
        match Feature::LongestStreak.extract(data).unwrap() {
            FeatureValue::Run(byte, length) => {
                assert_eq!(byte, b'C');
                assert_eq!(length, 4);
            }
            other => panic!("unexpected value: {other:?}"),
        }
        assert!(Feature::ShannonEntropy
            .extract(data)
            .unwrap()
            .as_scalar()
            .is_some());
        assert!(matches!(
            Feature::Label.extract(data),
            Err(SiftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_value_json_round_trip() {
        let scalar = FeatureValue::Scalar(3.25);
        let json = serde_json::to_value(&scalar).unwrap();
        assert_eq!(
            FeatureValue::from_json(ValueKind::Scalar, &json).unwrap(),
            scalar
        );

        let dist = FeatureValue::Distribution(BTreeMap::from([(0u16, 3u64), (255, 7)]));
        let json = serde_json::to_value(&dist).unwrap();
        assert_eq!(
            FeatureValue::from_json(ValueKind::Distribution, &json).unwrap(),
            dist
        );

        let run = FeatureValue::Run(b'C', 4);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json, serde_json::json!([67, 4]));
        assert_eq!(FeatureValue::from_json(ValueKind::Run, &json).unwrap(), run);

        let labels = FeatureValue::Labels(vec!["EXE".to_string(), "PACKED".to_string()]);
        let json = serde_json::to_value(&labels).unwrap();
        assert_eq!(
            FeatureValue::from_json(ValueKind::Labels, &json).unwrap(),
            labels
        );
    }

    #[test]
    fn test_shape_mismatch_is_corrupt() {
        let scalar = serde_json::json!(1.5);
        assert!(matches!(
            FeatureValue::from_json(ValueKind::Distribution, &scalar),
            Err(SiftError::CorruptData(_))
        ));
        let bad_run = serde_json::json!([300, 4]);
        assert!(matches!(
            FeatureValue::from_json(ValueKind::Run, &bad_run),
            Err(SiftError::CorruptData(_))
        ));
        let bad_key = serde_json::json!({"xyz": 1});
        assert!(matches!(
            FeatureValue::from_json(ValueKind::Distribution, &bad_key),
            Err(SiftError::CorruptData(_))
        ));
    }
}
