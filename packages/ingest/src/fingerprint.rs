//! Master table fingerprints.
//!
//! A fingerprint is derived from the master file's size and modification
//! time. It is appended to extract file names, so rebuilding the master
//! table makes every previously generated extract unreachable.

use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::IngestError;

/// Short hex digest identifying one version of the master table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MasterFingerprint(String);

impl MasterFingerprint {
    /// Number of hex characters kept from the digest.
    pub const LEN: usize = 12;

    /// Computes the fingerprint of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MasterNotFound`] if the file does not exist,
    /// or an I/O error if its metadata cannot be read.
    pub fn of(path: &Path) -> Result<Self, IngestError> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::MasterNotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let modified_nanos = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());

        Ok(Self::from_parts(metadata.len(), modified_nanos))
    }

    /// Computes a fingerprint from a file length and modification time.
    #[must_use]
    pub fn from_parts(len: u64, modified_nanos: u128) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(len.to_le_bytes());
        hasher.update(modified_nanos.to_le_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(Self::LEN);
        Self(digest)
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MasterFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn depends_on_length_and_mtime() {
        let a = MasterFingerprint::from_parts(100, 1);
        assert_eq!(a, MasterFingerprint::from_parts(100, 1));
        assert_ne!(a, MasterFingerprint::from_parts(101, 1));
        assert_ne!(a, MasterFingerprint::from_parts(100, 2));
        assert_eq!(a.as_str().len(), MasterFingerprint::LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stable_for_unchanged_file() {
        let dir = temp_dir("fingerprint");
        let path = dir.join("master.csv");
        std::fs::write(&path, "occurred_at,OFFENSE\n").unwrap();

        let first = MasterFingerprint::of(&path).unwrap();
        let second = MasterFingerprint::of(&path).unwrap();
        assert_eq!(first, second);

        std::fs::write(&path, "occurred_at,OFFENSE\n2020-01-01,ROBBERY\n").unwrap();
        assert_ne!(first, MasterFingerprint::of(&path).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_master_not_found() {
        let dir = temp_dir("fingerprint_missing");
        assert!(matches!(
            MasterFingerprint::of(&dir.join("missing.csv")),
            Err(IngestError::MasterNotFound(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
