//! Disk Tier Module
//!
//! Provides the persistent cold tier: payload files with JSON metadata
//! sidecars, written atomically and reclaimed by a periodic sweep.

use std::path::{Path, PathBuf};

mod metadata;
mod store;

// Re-export public types
pub use metadata::{MetadataRecord, MetadataStore};
pub use store::{DiskCache, SweepStats};

/// File extension for payload files.
pub(crate) const PAYLOAD_EXT: &str = "bin";

/// File extension for metadata sidecar files.
pub(crate) const METADATA_EXT: &str = "meta";

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Returns the temporary staging path for a target file.
///
/// Writers stage content at this path and rename it into place, so readers
/// only ever observe complete files.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    append_suffix(path, ".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_path_appends_suffix() {
        let path = PathBuf::from("/cache/abc.bin");
        assert_eq!(tmp_path(&path), PathBuf::from("/cache/abc.bin.tmp"));
    }
}
