use crate::error::{Result, SiftError};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An immutable, content-addressed byte buffer with an ordered label set.
///
/// The buffer lives behind an `Arc` so clones are cheap and extraction
/// workers can share it without copying. Identity is the SHA-256 hex digest
/// of the raw bytes, computed once at construction: two objects with
/// identical contents are the same object regardless of where they came
/// from.
#[derive(Clone)]
pub struct BinaryObject {
    data: Arc<[u8]>,
    hash: String,
    labels: Vec<String>,
    source: Option<PathBuf>,
}

impl BinaryObject {
    /// Create an object from an in-memory buffer
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let hash = format!("{:x}", Sha256::digest(&data));
        Self {
            data,
            hash,
            labels: Vec::new(),
            source: None,
        }
    }

    /// Load an object from a file, remembering the originating path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let mut object = Self::from_bytes(data);
        object.source = Some(path.to_path_buf());
        Ok(object)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the Arc-wrapped buffer for shared access across tasks
    pub fn share_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content hash (lowercase hex SHA-256), stable for the object's lifetime
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Append a label, preserving insertion order. Returns false if the
    /// label was already present.
    pub fn add_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.labels.contains(&label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    /// Originating file path, if this object was loaded from disk
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Uppercased file extension of the source path, empty string when the
    /// object has no source or the file has no extension
    pub fn extension_label(&self) -> String {
        self.source
            .as_deref()
            .and_then(Path::extension)
            .map(|ext| ext.to_string_lossy().to_uppercase())
            .unwrap_or_default()
    }

    /// Split the buffer into contiguous chunks of `chunk_size` bytes; the
    /// last chunk may be shorter. Chunks inherit the parent's labels and
    /// source path. Fails when `chunk_size` is zero or does not actually
    /// split the buffer (`chunk_size >= len`).
    pub fn segment(&self, chunk_size: usize) -> Result<Segments<'_>> {
        if chunk_size == 0 || chunk_size >= self.data.len() {
            return Err(SiftError::InvalidChunkSize {
                chunk_size,
                object_len: self.data.len(),
            });
        }
        Ok(Segments {
            parent: self,
            chunk_size,
            position: 0,
        })
    }

    pub fn md5(&self) -> String {
        format!("{:x}", Md5::digest(&self.data))
    }

    pub fn sha1(&self) -> String {
        format!("{:x}", Sha1::digest(&self.data))
    }

    pub fn sha224(&self) -> String {
        format!("{:x}", Sha224::digest(&self.data))
    }

    pub fn sha256(&self) -> String {
        format!("{:x}", Sha256::digest(&self.data))
    }

    pub fn sha384(&self) -> String {
        format!("{:x}", Sha384::digest(&self.data))
    }

    pub fn sha512(&self) -> String {
        format!("{:x}", Sha512::digest(&self.data))
    }
}

impl PartialEq for BinaryObject {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for BinaryObject {}

impl fmt::Debug for BinaryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryObject")
            .field("len", &self.data.len())
            .field("hash", &&self.hash[..12.min(self.hash.len())])
            .field("labels", &self.labels)
            .field("source", &self.source)
            .finish()
    }
}

/// Lazy iterator over the chunks of a segmented object
pub struct Segments<'a> {
    parent: &'a BinaryObject,
    chunk_size: usize,
    position: usize,
}

impl Iterator for Segments<'_> {
    type Item = BinaryObject;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.parent.data.len() {
            return None;
        }
        let end = (self.position + self.chunk_size).min(self.parent.data.len());
        let mut chunk = BinaryObject::from_bytes(&self.parent.data[self.position..end]);
        chunk.labels = self.parent.labels.clone();
        chunk.source = self.parent.source.clone();
        self.position = end;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_same_hash() {
        let a = BinaryObject::from_bytes(b"hello world".as_slice());
        let b = BinaryObject::from_bytes(b"hello world".to_vec());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);

        let c = BinaryObject::from_bytes(b"hello worlds".as_slice());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_known_digests() {
        let object = BinaryObject::from_bytes(b"abc".as_slice());
        assert_eq!(object.md5(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(object.sha1(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            object.sha256(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(object.hash(), object.sha256().as_str());
    }

    #[test]
    fn test_labels_ordered_and_deduplicated() {
        let mut object = BinaryObject::from_bytes(b"data".as_slice());
        assert!(object.add_label("EXE"));
        assert!(object.add_label("PACKED"));
        assert!(!object.add_label("EXE"));
        assert_eq!(object.labels(), &["EXE".to_string(), "PACKED".to_string()]);
    }

    #[test]
    fn test_segmentation_covers_buffer() {
        let object = BinaryObject::from_bytes(b"0123456789".as_slice());
        let chunks: Vec<BinaryObject> = object.segment(4).unwrap().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data(), b"0123");
        assert_eq!(chunks[1].data(), b"4567");
        assert_eq!(chunks[2].data(), b"89");
    }

    #[test]
    fn test_segment_chunks_inherit_labels() {
        let mut object = BinaryObject::from_bytes(b"0123456789".as_slice());
        object.add_label("BIN");
        let chunks: Vec<BinaryObject> = object.segment(5).unwrap().collect();
        assert!(chunks.iter().all(|chunk| chunk.labels() == ["BIN"]));
    }

    #[test]
    fn test_invalid_chunk_sizes() {
        let object = BinaryObject::from_bytes(b"0123456789".as_slice());
        assert!(matches!(
            object.segment(0),
            Err(SiftError::InvalidChunkSize { chunk_size: 0, .. })
        ));
        assert!(matches!(
            object.segment(10),
            Err(SiftError::InvalidChunkSize { chunk_size: 10, .. })
        ));
        assert!(matches!(
            object.segment(64),
            Err(SiftError::InvalidChunkSize { chunk_size: 64, .. })
        ));
    }

    #[test]
    fn test_extension_label() {
        let mut dir = std::env::temp_dir();
        let unique = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("bytesift_object_{unique}"));
        fs::create_dir_all(&dir).unwrap();

        let with_ext = dir.join("sample.bin");
        fs::write(&with_ext, b"payload").unwrap();
        let object = BinaryObject::from_file(&with_ext).unwrap();
        assert_eq!(object.extension_label(), "BIN");
        assert_eq!(object.source(), Some(with_ext.as_path()));

        let without_ext = dir.join("sample");
        fs::write(&without_ext, b"payload2").unwrap();
        let object = BinaryObject::from_file(&without_ext).unwrap();
        assert_eq!(object.extension_label(), "");

        assert_eq!(
            BinaryObject::from_bytes(b"mem".as_slice()).extension_label(),
            ""
        );
    }
}
