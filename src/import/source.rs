use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::ImportError;
use crate::fatturapa::is_enveloped;

/// One input file: read once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Read a file from disk, keeping only its base name.
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, bytes })
    }

    /// Wrap an uploaded payload.
    pub fn from_upload(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercase hex SHA-256 of the raw bytes (envelope included).
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Whether the file is a `.p7m` envelope.
    pub fn is_enveloped(&self) -> bool {
        is_enveloped(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        let f = SourceFile::from_upload("a.xml", b"abc".to_vec());
        assert_eq!(
            f.content_hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn envelope_flag_follows_extension() {
        assert!(SourceFile::from_upload("IT1_001.xml.P7M", Vec::new()).is_enveloped());
        assert!(!SourceFile::from_upload("IT1_001.xml", Vec::new()).is_enveloped());
    }

    #[test]
    fn from_path_keeps_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.xml");
        std::fs::write(&path, b"<a/>").unwrap();
        let f = SourceFile::from_path(&path).unwrap();
        assert_eq!(f.file_name, "x.xml");
        assert_eq!(f.bytes, b"<a/>");
    }
}
