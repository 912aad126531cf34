//! Host filesystem standing in for the SD card's root directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use airlog_core::storage::{Storage, StorageError};
use log::error;

pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn io_error(operation: &'static str) -> impl FnOnce(io::Error) -> StorageError {
    move |e| {
        error!("[SD] {} failed: {}", operation, e);
        StorageError::Io { operation }
    }
}

/// FAT32 sizes fit in a `u32`; anything larger cannot come from a card.
fn file_size(len: u64) -> Result<u32, StorageError> {
    u32::try_from(len).map_err(|_| {
        error!("[SD] File size {} exceeds 4 GiB", len);
        StorageError::Io { operation: "size" }
    })
}

impl Storage for FsStorage {
    fn probe(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            error!("[SD] Cannot create {}: {}", self.root.display(), e);
            StorageError::Unavailable
        })
    }

    fn append(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))
            .map_err(io_error("open for append"))?;
        file.write_all(data).map_err(io_error("append"))
    }

    fn write(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        fs::write(self.path(name), data).map_err(io_error("write"))
    }

    fn read_at(
        &mut self,
        name: &'static str,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let mut file = match File::open(self.path(name)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound { name });
            }
            Err(e) => return Err(io_error("open for read")(e)),
        };
        file.seek(SeekFrom::Start(u64::from(offset)))
            .map_err(io_error("seek"))?;
        file.read(buf).map_err(io_error("read"))
    }

    fn size(&mut self, name: &'static str) -> Result<Option<u32>, StorageError> {
        match fs::metadata(self.path(name)) {
            Ok(meta) => file_size(meta.len()).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("stat")(e)),
        }
    }

    fn remove(&mut self, name: &'static str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete")(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> FsStorage {
        let root = std::env::temp_dir()
            .join(format!("airlog-fs-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        FsStorage::new(root)
    }

    #[test]
    fn test_size_rejects_lengths_past_u32() {
        assert_eq!(file_size(4096), Ok(4096));
        assert_eq!(file_size(u64::from(u32::MAX)), Ok(u32::MAX));
        assert_eq!(
            file_size(u64::from(u32::MAX) + 1),
            Err(StorageError::Io { operation: "size" })
        );
    }

    #[test]
    fn test_size_tracks_appends() {
        let mut storage = scratch("size");

        assert_eq!(storage.size("DATALOG.TXT"), Ok(None));
        storage.append("DATALOG.TXT", b"first\n").unwrap();
        storage.append("DATALOG.TXT", b"second\n").unwrap();
        assert_eq!(storage.size("DATALOG.TXT"), Ok(Some(13)));

        let _ = fs::remove_dir_all(&storage.root);
    }
}
