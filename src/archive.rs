use std::io::{Cursor, Read};

use bytes::Bytes;
use log::info;
use zip::ZipArchive;

use crate::error::{EtlError, Result};
use crate::locator::RunKey;
use crate::store::{ArtifactStore, StoreError};

// Declared entry sizes come from the archive itself; larger entries still
// read fully, the buffer just grows as it goes.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size.min(MAX_PREALLOCATION)).unwrap_or_default()
}

/// A test-run archive held in memory for one invocation.
///
/// File names are listed when the archive is opened; entries are only
/// decompressed when read.
pub struct Archive {
    key: String,
    file_names: Vec<String>,
    zip: ZipArchive<Cursor<Bytes>>,
}

impl Archive {
    pub fn from_bytes(key: &str, data: Bytes) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(data)).map_err(|e| EtlError::ArchiveCorrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let mut file_names: Vec<String> = zip.file_names().map(ToString::to_string).collect();
        file_names.sort();

        Ok(Self {
            key: key.to_string(),
            file_names,
            zip,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every entry name in the archive, sorted.
    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let corrupt = |message: String| EtlError::ArchiveCorrupt {
            key: self.key.clone(),
            message,
        };

        let mut entry = self
            .zip
            .by_name(name)
            .map_err(|e| corrupt(format!("{name}: {e}")))?;

        let mut buffer = Vec::with_capacity(initial_capacity(entry.size()));
        entry
            .read_to_end(&mut buffer)
            .map_err(|e| corrupt(format!("{name}: {e}")))?;

        Ok(buffer)
    }
}

/// Downloads the archive for `run_key` and opens it.
pub async fn fetch_and_unpack(store: &dyn ArtifactStore, run_key: &RunKey) -> Result<Archive> {
    let key = run_key.as_str();
    info!("Fetching archive {key} from {}", store.name());

    let data = store.get(key).await.map_err(|e| match e {
        StoreError::NotFound { .. } => EtlError::ArchiveNotFound {
            key: key.to_string(),
        },
        other => EtlError::ArchiveRead {
            key: key.to_string(),
            message: other.to_string(),
        },
    })?;

    info!("Downloaded {key} ({} bytes), unpacking", data.len());

    let archive = Archive::from_bytes(key, data)?;
    info!("Archive {key} contains {} files", archive.file_names().len());

    Ok(archive)
}
