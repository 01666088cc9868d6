use crate::error::{Result, SiftError};
use crate::object::BinaryObject;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Outcome of a bulk ingest: how many distinct objects were added, how many
/// insertions deduplicated away, and which paths could not be read.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub added: usize,
    pub duplicates: usize,
    pub failures: Vec<LoadFailure>,
}

/// A single file that could not be ingested
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// A content-addressed collection of binary objects.
///
/// Objects are keyed by their SHA-256 content hash, so insertion is
/// idempotent: content already present is a no-op and `len()` counts
/// distinct contents, not insertion calls. Iteration order is ascending by
/// hash, which keeps downstream matrices deterministic. Insertion requires
/// `&mut self`, so the dedup check-and-insert is exclusive by construction;
/// concurrent producers must serialize through a lock or a channel.
#[derive(Debug, Default)]
pub struct Dataset {
    objects: BTreeMap<String, BinaryObject>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&BinaryObject> {
        self.objects.get(hash)
    }

    pub fn objects(&self) -> impl Iterator<Item = &BinaryObject> {
        self.objects.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BinaryObject)> {
        self.objects.iter()
    }

    /// Insert an object, deduplicating by content hash. Returns true if the
    /// object was new.
    pub fn insert(&mut self, object: BinaryObject) -> bool {
        let hash = object.hash().to_string();
        if self.objects.contains_key(&hash) {
            return false;
        }
        debug!(hash = %hash, len = object.len(), "added object");
        self.objects.insert(hash, object);
        true
    }

    /// Recursively ingest every file under `dir`, optionally keeping only
    /// file names the filter matches. A missing or unreadable root is a
    /// typed error; individual unreadable files are recorded in the report
    /// (and abort the scan when `fail_fast` is set).
    pub fn load_from_directory(
        &mut self,
        dir: &Path,
        filter: Option<&Regex>,
        fail_fast: bool,
    ) -> Result<LoadReport> {
        if !dir.is_dir() {
            return Err(SiftError::DirectoryNotFound(
                dir.to_string_lossy().to_string(),
            ));
        }

        let mut report = LoadReport::default();
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| dir.to_path_buf());
                    if fail_fast {
                        return Err(SiftError::Io(std::io::Error::other(err)));
                    }
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    report.failures.push(LoadFailure {
                        path,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(filter) = filter {
                let name = entry.file_name().to_string_lossy();
                if !filter.is_match(&name) {
                    continue;
                }
            }
            match BinaryObject::from_file(entry.path()) {
                Ok(object) => {
                    if self.insert(object) {
                        report.added += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(err) => {
                    if fail_fast {
                        return Err(err);
                    }
                    warn!(path = %entry.path().display(), error = %err, "skipping unreadable file");
                    report.failures.push(LoadFailure {
                        path: entry.path().to_path_buf(),
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Insert a single file. Returns true if its content was new.
    pub fn add_file(&mut self, path: &Path) -> Result<bool> {
        let object = BinaryObject::from_file(path)?;
        Ok(self.insert(object))
    }

    /// Insert a list of files; returns the number of distinct objects added
    pub fn add_files(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let mut added = 0;
        for path in paths {
            if self.add_file(path)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Tag every object that has a source path with its uppercased file
    /// extension (empty string when the file has none)
    pub fn label_by_extension(&mut self) {
        for object in self.objects.values_mut() {
            if object.source().is_some() {
                let label = object.extension_label();
                object.add_label(label);
            }
        }
    }

    /// Insert an object split into `chunk_size`-byte segments, each chunk
    /// deduplicated independently. A chunk size of zero inserts the whole
    /// object unsplit. Returns the number of distinct objects added.
    pub fn add_segmented(&mut self, object: &BinaryObject, chunk_size: usize) -> Result<usize> {
        if chunk_size == 0 {
            return Ok(usize::from(self.insert(object.clone())));
        }
        let mut added = 0;
        for chunk in object.segment(chunk_size)? {
            if self.insert(chunk) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Build a new dataset by segmenting every object of this one. Objects
    /// too small to split are carried over whole and reported.
    pub fn segmented(&self, chunk_size: usize) -> Result<(Dataset, usize)> {
        let mut segmented = Dataset::new();
        let mut carried_whole = 0;
        for object in self.objects.values() {
            if chunk_size > 0 && chunk_size >= object.len() {
                warn!(
                    hash = %object.hash(),
                    len = object.len(),
                    chunk_size,
                    "object smaller than chunk size, keeping whole"
                );
                segmented.insert(object.clone());
                carried_whole += 1;
                continue;
            }
            segmented.add_segmented(object, chunk_size)?;
        }
        Ok((segmented, carried_whole))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("bytesift_dataset_{tag}_{unique}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_duplicate_content_deduplicated() {
        let dir = temp_dir("dedup");
        fs::write(dir.join("first.bin"), b"same payload").unwrap();
        fs::write(dir.join("second.dat"), b"same payload").unwrap();
        fs::write(dir.join("third.bin"), b"different payload").unwrap();

        let mut dataset = Dataset::new();
        let report = dataset.load_from_directory(&dir, None, false).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_recursive_load_with_filter() {
        let dir = temp_dir("filter");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("keep.bin"), b"alpha").unwrap();
        fs::write(dir.join("nested/keep_too.bin"), b"beta").unwrap();
        fs::write(dir.join("drop.txt"), b"gamma").unwrap();

        let filter = Regex::new(r"\.bin$").unwrap();
        let mut dataset = Dataset::new();
        let report = dataset
            .load_from_directory(&dir, Some(&filter), false)
            .unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_typed_error() {
        let mut dataset = Dataset::new();
        let missing = PathBuf::from("/definitely/not/a/real/directory");
        assert!(matches!(
            dataset.load_from_directory(&missing, None, false),
            Err(SiftError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_label_by_extension() {
        let dir = temp_dir("labels");
        fs::write(dir.join("sample.exe"), b"exe bytes").unwrap();
        fs::write(dir.join("readme"), b"no extension").unwrap();

        let mut dataset = Dataset::new();
        dataset.load_from_directory(&dir, None, false).unwrap();
        dataset.label_by_extension();

        let labels: Vec<&[String]> = dataset.objects().map(BinaryObject::labels).collect();
        assert!(labels.contains(&["EXE".to_string()].as_slice()));
        assert!(labels.contains(&[String::new()].as_slice()));
    }

    #[test]
    fn test_add_segmented() {
        let object = BinaryObject::from_bytes(b"0123456789".as_slice());
        let mut dataset = Dataset::new();
        let added = dataset.add_segmented(&object, 4).unwrap();
        // chunks 0123 / 4567 / 89, all distinct
        assert_eq!(added, 3);
        assert_eq!(dataset.len(), 3);

        // chunk size zero inserts the whole object
        let mut whole = Dataset::new();
        assert_eq!(whole.add_segmented(&object, 0).unwrap(), 1);
        assert_eq!(whole.len(), 1);
        assert!(whole.get(object.hash()).is_some());
    }

    #[test]
    fn test_segmented_dataset_deduplicates_chunks() {
        // two identical halves collapse to one chunk object
        let object = BinaryObject::from_bytes(b"abcdabcd".as_slice());
        let mut dataset = Dataset::new();
        let added = dataset.add_segmented(&object, 4).unwrap();
        assert_eq!(added, 1);
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_segmented_carries_small_objects_whole() {
        let mut source = Dataset::new();
        source.insert(BinaryObject::from_bytes(b"tiny".as_slice()));
        source.insert(BinaryObject::from_bytes(b"a much longer payload".as_slice()));

        let (segmented, carried) = source.segmented(8).unwrap();
        assert_eq!(carried, 1);
        // 21-byte object splits into 3 chunks, tiny object kept whole
        assert_eq!(segmented.len(), 4);
    }
}
