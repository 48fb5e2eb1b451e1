//! Image artifact store.
//!
//! Opaque image handles never cross the wire as pixels: callers exchange
//! content hashes instead, and the bytes move through the artifact HTTP
//! routes. This is a small Git-like object store addressed by the BLAKE3
//! hash of the content, truncated to 16 bytes (32 hex chars) — fast, and
//! still collision-resistant at that length.
//!
//! Layout:
//!   <root>/objects/ab/cdef...   (content)
//!   <root>/metadata/ab/cdef...  (JSON: mime type, size)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Metadata stored alongside each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub mime_type: String,
    pub size: u64,
}

/// What `inspect` hands back: the handle plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub hash: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    objects_dir: PathBuf,
    metadata_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: &Path) -> Result<Self> {
        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir).context("Failed to create artifact objects directory")?;

        let metadata_dir = root.join("metadata");
        fs::create_dir_all(&metadata_dir).context("Failed to create artifact metadata directory")?;

        Ok(Self {
            objects_dir,
            metadata_dir,
        })
    }

    /// Store `data`, returning its content hash. Writing the same content
    /// twice is a no-op that returns the same hash.
    pub fn write(&self, data: &[u8], mime_type: &str) -> Result<String> {
        let digest = blake3::hash(data);
        let hash = hex::encode(&digest.as_bytes()[..16]);

        let object_path = self.fan_out(&self.objects_dir, &hash)?;
        if !object_path.exists() {
            fs::write(&object_path, data).context("Failed to write artifact object")?;
        }

        let metadata_path = self.fan_out(&self.metadata_dir, &hash)?;
        if !metadata_path.exists() {
            let metadata = ArtifactMetadata {
                mime_type: mime_type.to_string(),
                size: data.len() as u64,
            };
            let json = serde_json::to_string(&metadata)
                .context("Failed to serialize artifact metadata")?;
            fs::write(&metadata_path, json).context("Failed to write artifact metadata")?;
        }

        Ok(hash)
    }

    /// Read the content for `hash`, or `None` if it was never stored.
    pub fn read(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.fan_out(&self.objects_dir, self.validate(hash)?)?;
        if path.exists() {
            Ok(Some(fs::read(&path).context("Failed to read artifact object")?))
        } else {
            Ok(None)
        }
    }

    /// Metadata for `hash` without touching the content.
    pub fn inspect(&self, hash: &str) -> Result<Option<ArtifactReference>> {
        let path = self.fan_out(&self.metadata_dir, self.validate(hash)?)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).context("Failed to read artifact metadata")?;
        let metadata: ArtifactMetadata =
            serde_json::from_str(&json).context("Failed to parse artifact metadata")?;
        Ok(Some(ArtifactReference {
            hash: hash.to_string(),
            mime_type: metadata.mime_type,
            size: metadata.size,
        }))
    }

    fn validate<'a>(&self, hash: &'a str) -> Result<&'a str> {
        if hash.len() == 32 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(hash)
        } else {
            anyhow::bail!("invalid artifact hash `{}`", hash)
        }
    }

    /// Path for `hash` under `base`, creating the two-char fanout directory.
    fn fan_out(&self, base: &Path, hash: &str) -> Result<PathBuf> {
        let dir = base.join(&hash[..2]);
        if !dir.exists() {
            fs::create_dir_all(&dir).context("Failed to create fanout directory")?;
        }
        Ok(dir.join(&hash[2..]))
    }
}
