//! Metadata Store Module
//!
//! Persists one small JSON sidecar per cached payload. Expiration and
//! eviction decisions on the disk tier read only these records, never the
//! payload files themselves.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::disk::{tmp_path, METADATA_EXT};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

// == Metadata Record ==
/// Sidecar record describing one persisted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// The key the payload was stored under
    pub key: CacheKey,
    /// Payload size in bytes, checked against the payload file on load
    pub size_bytes: u64,
    /// When the entry was persisted
    pub created_at: DateTime<Utc>,
    /// When the entry stops being servable
    pub expires_at: DateTime<Utc>,
    /// Last time the entry was loaded, drives disk eviction order
    pub last_accessed_at: DateTime<Utc>,
}

impl MetadataRecord {
    // == Constructor ==
    /// Creates a record for a payload persisted now with the given TTL.
    ///
    /// TTLs too large to represent saturate to the maximum timestamp.
    pub fn new(key: CacheKey, size_bytes: u64, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key,
            size_bytes,
            created_at: now,
            expires_at,
            last_accessed_at: now,
        }
    }

    // == Is Expired ==
    /// Checks if the recorded TTL has elapsed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, `Duration::ZERO` once expired.
    ///
    /// Promotions into the memory tier carry this value so a promoted entry
    /// never outlives its persisted expiry.
    pub fn ttl_remaining(&self) -> Duration {
        let now = Utc::now();
        if self.expires_at > now {
            (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    // == Touch ==
    /// Records an access at the current time.
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

// == Metadata Store ==
/// Reads and writes metadata sidecars under the disk tier root.
///
/// Sidecars are named `<sha256(key)>.meta` and co-located with their
/// payloads. Writes stage to a `.tmp` path and rename into place, so a
/// reader never observes a partially written record.
#[derive(Debug)]
pub struct MetadataStore {
    /// Directory holding the sidecar files
    root: PathBuf,
}

impl MetadataStore {
    // == Constructor ==
    /// Creates a store rooted at `root`. The directory must already exist.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the sidecar path for a key.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.file_stem(), METADATA_EXT))
    }

    // == Write ==
    /// Persists a record atomically.
    pub async fn write(&self, record: &MetadataRecord) -> Result<()> {
        let path = self.path_for(&record.key);
        let staging = tmp_path(&path);

        let bytes = serde_json::to_vec(record)
            .map_err(|e| CacheError::Internal(format!("metadata encoding failed: {}", e)))?;

        fs::write(&staging, &bytes)
            .await
            .map_err(|e| CacheError::io(&staging, e))?;

        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(CacheError::io(&path, e));
        }

        Ok(())
    }

    // == Read ==
    /// Loads the record for a key.
    ///
    /// # Returns
    /// - `Ok(None)` when no sidecar exists
    /// - `CacheError::CorruptedEntry` when a sidecar exists but cannot be
    ///   decoded, so the caller can delete the entry and fall open
    pub async fn read(&self, key: &CacheKey) -> Result<Option<MetadataRecord>> {
        let path = self.path_for(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => Err(CacheError::CorruptedEntry {
                key: key.clone(),
                reason: format!("undecodable metadata sidecar: {}", e),
            }),
        }
    }

    // == Delete ==
    /// Removes the sidecar for a key. Missing sidecars are a no-op.
    pub async fn delete(&self, key: &CacheKey) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    // == List All ==
    /// Reads every sidecar under the root.
    ///
    /// Sidecars that cannot be decoded, or whose file name does not match
    /// the key they claim to describe, are deleted on the spot. Returns the
    /// valid records and the number of sidecars removed this way.
    pub async fn list_all(&self) -> Result<(Vec<MetadataRecord>, usize)> {
        let mut records = Vec::new();
        let mut corrupted_removed = 0;

        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;

        while let Some(dir_entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let path = dir_entry.path();
            let is_sidecar = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == METADATA_EXT)
                .unwrap_or(false);
            if !is_sidecar {
                continue;
            }

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable sidecar");
                    continue;
                }
            };

            match serde_json::from_slice::<MetadataRecord>(&bytes) {
                Ok(record) => {
                    let expected_name = format!("{}.{}", record.key.file_stem(), METADATA_EXT);
                    let actual_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if actual_name == expected_name {
                        records.push(record);
                    } else {
                        warn!(
                            path = %path.display(),
                            key = %record.key,
                            "sidecar name does not match its key, removing"
                        );
                        let _ = fs::remove_file(&path).await;
                        corrupted_removed += 1;
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "removing undecodable sidecar");
                    let _ = fs::remove_file(&path).await;
                    corrupted_removed += 1;
                }
            }
        }

        Ok((records, corrupted_removed))
    }
}
