use crate::feature::{Feature, EXTRACTABLE};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bytesift - content-addressed byte-statistics extraction for binary
/// sample classification
#[derive(Parser, Debug, Clone)]
#[command(name = "bytesift")]
#[command(version = "0.1.0")]
#[command(about = "Byte-level feature extraction pipeline", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest a directory of samples and extract features to a JSON file
    Extract(ExtractArgs),

    /// Load a saved feature file and print a summary
    Inspect(InspectArgs),

    /// Split a saved feature file into training and test partitions
    Split(SplitArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Directory containing sample files
    #[arg(value_name = "SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// Output file for the extracted features
    #[arg(short = 'o', long = "output", default_value = "features.json")]
    pub output: PathBuf,

    /// Features to extract (catalog names, case-insensitive; 'all' selects
    /// the whole catalog)
    #[arg(short = 'f', long = "features", value_delimiter = ',', default_value = "shannon_entropy")]
    pub features: Vec<String>,

    /// Regular expression applied to file names; non-matching files are skipped
    #[arg(long = "filter")]
    pub filter: Option<String>,

    /// Split every file into chunks of this many bytes (0 = whole files)
    #[arg(long = "segment-size", default_value = "0")]
    pub segment_size: usize,

    /// Maximum number of concurrent extraction tasks
    #[arg(long = "max-in-flight", default_value = "30")]
    pub max_in_flight: usize,

    /// Abort on the first unreadable file or failed extraction
    #[arg(long = "strict")]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InspectArgs {
    /// Feature file produced by the extract command
    #[arg(value_name = "FEATURE_FILE")]
    pub input: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SplitArgs {
    /// Feature file produced by the extract command
    #[arg(value_name = "FEATURE_FILE")]
    pub input: PathBuf,

    /// Output file for the training partition
    #[arg(long = "train-output", default_value = "train.json")]
    pub train_output: PathBuf,

    /// Output file for the test partition
    #[arg(long = "test-output", default_value = "test.json")]
    pub test_output: PathBuf,

    /// Fraction of rows assigned to the training partition
    #[arg(short = 'r', long = "ratio", default_value = "0.9")]
    pub ratio: f64,

    /// Shuffle seed for a reproducible partition
    #[arg(long = "seed", default_value = "42")]
    pub seed: u64,
}

/// Resolve CLI feature names against the catalog. Accepts catalog names in
/// any case and the 'all' shorthand.
pub fn parse_features(names: &[String]) -> Result<Vec<Feature>, String> {
    let mut features = Vec::new();
    for name in names {
        if name.eq_ignore_ascii_case("all") {
            for feature in EXTRACTABLE {
                if !features.contains(&feature) {
                    features.push(feature);
                }
            }
            continue;
        }
        let feature: Feature = name
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| format!("unknown feature: {name}"))?;
        if feature == Feature::Label {
            return Err("LABEL is attached automatically and cannot be requested".to_string());
        }
        if !features.contains(&feature) {
            features.push(feature);
        }
    }
    if features.is_empty() {
        return Err("no features selected".to_string());
    }
    Ok(features)
}

impl Args {
    /// Validate the arguments
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Extract(args) => {
                if args.source_dir.as_os_str().is_empty() {
                    return Err("source directory cannot be empty".to_string());
                }
                parse_features(&args.features)?;
                if let Some(filter) = &args.filter {
                    regex::Regex::new(filter)
                        .map_err(|err| format!("invalid filter pattern: {err}"))?;
                }
                if args.max_in_flight == 0 {
                    return Err("max-in-flight must be greater than 0".to_string());
                }
                Ok(())
            }
            Command::Inspect(_) => Ok(()),
            Command::Split(args) => {
                if !(args.ratio > 0.0 && args.ratio < 1.0) {
                    return Err(format!(
                        "ratio ({}) must be strictly between 0 and 1",
                        args.ratio
                    ));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_args() -> ExtractArgs {
        ExtractArgs {
            source_dir: PathBuf::from("samples"),
            output: PathBuf::from("features.json"),
            features: vec!["shannon_entropy".to_string()],
            filter: None,
            segment_size: 0,
            max_in_flight: 30,
            strict: false,
        }
    }

    #[test]
    fn test_extract_validation() {
        let args = Args {
            command: Command::Extract(extract_args()),
        };
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let mut extract = extract_args();
        extract.features = vec!["byte_magic".to_string()];
        let args = Args {
            command: Command::Extract(extract),
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let mut extract = extract_args();
        extract.filter = Some("[unclosed".to_string());
        let args = Args {
            command: Command::Extract(extract),
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_features_names_and_all() {
        let features = parse_features(&["bfd".to_string(), "STD_KURTOSIS".to_string()]).unwrap();
        assert_eq!(features, vec![Feature::Bfd, Feature::StdKurtosis]);

        let all = parse_features(&["all".to_string()]).unwrap();
        assert_eq!(all.len(), EXTRACTABLE.len());

        assert!(parse_features(&["label".to_string()]).is_err());
    }

    #[test]
    fn test_split_ratio_bounds() {
        for ratio in [0.0, 1.0, -0.1, 2.0] {
            let args = Args {
                command: Command::Split(SplitArgs {
                    input: PathBuf::from("features.json"),
                    train_output: PathBuf::from("train.json"),
                    test_output: PathBuf::from("test.json"),
                    ratio,
                    seed: 42,
                }),
            };
            assert!(args.validate().is_err());
        }
    }
}
