use std::{
    future::Future,
    io::{ErrorKind, SeekFrom},
    ops::Deref,
    path::PathBuf,
};

use fs4::tokio::AsyncFileExt;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, error, warn};

use super::entities::{ActivitySample, COLUMNS};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open activity log {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to lock activity log: {0}")]
    Lock(std::io::Error),
    #[error("Failed to encode activity row: {0}")]
    Encode(#[from] csv::Error),
    #[error("Failed to write activity row: {0}")]
    Write(std::io::Error),
    #[error("Failed to read activity log: {0}")]
    Read(std::io::Error),
}

/// Interface for abstracting the append-only activity log.
pub trait ActivityLog {
    /// Persists one row. Either the whole row becomes visible to later reads or the call fails
    /// and the log is left as it was.
    fn append(&self, sample: &ActivitySample) -> impl Future<Output = Result<(), StorageError>>;

    /// Every stored sample in insertion order.
    fn load_all(&self) -> impl Future<Output = Result<Vec<ActivitySample>, StorageError>>;
}

impl<T: Deref> ActivityLog for T
where
    T::Target: ActivityLog,
{
    fn append(&self, sample: &ActivitySample) -> impl Future<Output = Result<(), StorageError>> {
        self.deref().append(sample)
    }

    fn load_all(&self) -> impl Future<Output = Result<Vec<ActivitySample>, StorageError>> {
        self.deref().load_all()
    }
}

/// The main realization of [ActivityLog]: a CSV file with a header row.
pub struct CsvActivityLog {
    path: PathBuf,
    /// Makes the next writes stop after this many bytes and fail.
    #[cfg(test)]
    torn_write_at: Option<usize>,
}

impl CsvActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            #[cfg(test)]
            torn_write_at: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn open_for_append(&self) -> Result<File, StorageError> {
        File::options()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .await
            .map_err(|source| StorageError::Open {
                path: self.path.clone(),
                source,
            })
    }

    async fn append_locked(&self, file: &mut File, row: &[u8]) -> Result<(), StorageError> {
        let mut length = file.metadata().await.map_err(StorageError::Read)?.len();

        if length > 0 {
            let committed = committed_length(file, length)
                .await
                .map_err(StorageError::Read)?;
            if committed < length {
                // Bytes after the last newline were never a complete row.
                warn!(
                    "Activity log ends with {} byte(s) of a cut off row, discarding them",
                    length - committed
                );
                file.set_len(committed).await.map_err(StorageError::Write)?;
                length = committed;
            }
        }

        let mut buffer = Vec::with_capacity(row.len() + 128);
        if length == 0 {
            buffer.extend_from_slice(&header_row()?);
        }
        buffer.extend_from_slice(row);

        if let Err(e) = self.write(file, &buffer).await {
            // Append-mode writes land at the end, so cutting back to the old length removes
            // whatever part of the row made it to disk.
            if let Err(rollback) = file.set_len(length).await {
                error!("Failed to roll back partial activity row {rollback:?}");
            }
            return Err(StorageError::Write(e));
        }
        Ok(())
    }

    async fn write(&self, file: &mut File, buffer: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(at) = self.torn_write_at {
            file.write_all(&buffer[..at.min(buffer.len())]).await?;
            file.flush().await?;
            return Err(std::io::Error::other("write cut off"));
        }
        write_durably(file, buffer).await
    }

    async fn read_locked(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        file.lock_shared().map_err(StorageError::Lock)?;
        let mut content = Vec::new();
        let result = file.read_to_end(&mut content).await;
        file.unlock_async().await.map_err(StorageError::Lock)?;
        result.map_err(StorageError::Read)?;
        Ok(Some(content))
    }
}

impl ActivityLog for CsvActivityLog {
    async fn append(&self, sample: &ActivitySample) -> Result<(), StorageError> {
        let row = encode_row(sample)?;
        let mut file = self.open_for_append().await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive().map_err(StorageError::Lock)?;
        let result = self.append_locked(&mut file, &row).await;
        if let Err(e) = file.unlock_async().await {
            // The lock goes away with the file handle anyway. The row itself is settled.
            warn!("Failed to unlock activity log {e:?}");
        }
        result
    }

    async fn load_all(&self) -> Result<Vec<ActivitySample>, StorageError> {
        let Some(content) = self.read_locked().await? else {
            debug!("Activity log {:?} doesn't exist yet", self.path);
            return Ok(vec![]);
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_slice());
        let mut samples = vec![];
        for row in reader.deserialize::<ActivitySample>() {
            match row {
                Ok(v) => samples.push(v),
                Err(e) => {
                    // ignore illegal rows. Might happen after a crash cut off a write
                    warn!("Found illegal row in {:?}: {e}", self.path)
                }
            }
        }
        Ok(samples)
    }
}

fn header_row() -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(COLUMNS)?;
    into_bytes(writer)
}

fn encode_row(sample: &ActivitySample) -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    writer.serialize(sample)?;
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, StorageError> {
    writer
        .into_inner()
        .map_err(|e| StorageError::Encode(e.into_error().into()))
}

/// Length of the file up to and including its last newline.
async fn committed_length(file: &mut File, length: u64) -> std::io::Result<u64> {
    const CHUNK: u64 = 4096;
    let mut end = length;
    let mut buffer = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let window = &mut buffer[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(window).await?;
        if let Some(position) = window.iter().rposition(|v| *v == b'\n') {
            return Ok(start + position as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

async fn write_durably(file: &mut File, buffer: &[u8]) -> std::io::Result<()> {
    file.write_all(buffer).await?;
    file.flush().await?;
    file.sync_data().await
}
