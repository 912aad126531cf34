use core::fmt::Debug;

use embedded_sdmmc::{
    Error as SdmmcError, Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use log::{debug, error};
use time::UtcOffset;

use super::{Clock, Storage, StorageError};
use crate::timefmt;

/// Maps the logger clock onto FAT directory-entry timestamps.
pub struct ClockTimeSource<C> {
    clock: C,
    offset: UtcOffset,
}

impl<C: Clock> ClockTimeSource<C> {
    pub fn new(clock: C, offset: UtcOffset) -> Self {
        Self { clock, offset }
    }
}

impl<C: Clock> TimeSource for ClockTimeSource<C> {
    fn get_timestamp(&self) -> Timestamp {
        let local = timefmt::to_local(self.clock.now(), self.offset);
        Timestamp {
            // FAT cannot store anything before 1980
            year_since_1970: local.year().clamp(1980, 2107).saturating_sub(1970) as u8,
            zero_indexed_month: (local.month() as u8).saturating_sub(1),
            zero_indexed_day: local.day().saturating_sub(1),
            hours: local.hour(),
            minutes: local.minute(),
            seconds: local.second(),
        }
    }
}

fn io_error<E: Debug>(operation: &'static str) -> impl FnOnce(SdmmcError<E>) -> StorageError {
    move |e| {
        error!("[SD] {} failed: {:?}", operation, e);
        StorageError::Io { operation }
    }
}

/// SD card storage on the first FAT volume's root directory.
///
/// Operations are blocking, like everything else sharing the SPI bus.
pub struct SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }

    fn open_file_with(
        &self,
        name: &'static str,
        mode: Mode,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(io_error("open volume"))?;
        let root_dir = volume0.open_root_dir().map_err(io_error("open root dir"))?;
        let file = root_dir
            .open_file_in_dir(name, mode)
            .map_err(io_error("open file"))?;

        file.write(data).map_err(io_error("write"))?;

        // Explicitly close to surface flush errors
        file.close().map_err(io_error("close file"))?;
        root_dir.close().map_err(io_error("close dir"))?;
        volume0.close().map_err(io_error("close volume"))?;

        Ok(())
    }
}

impl<S, D, T> Storage for SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn probe(&mut self) -> Result<(), StorageError> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(|e| {
            error!("[SD] Card mount failed: {:?}", e);
            StorageError::Unavailable
        })?;
        let root_dir = volume0.open_root_dir().map_err(|e| {
            error!("[SD] Root directory unreadable: {:?}", e);
            StorageError::Unavailable
        })?;
        root_dir.close().map_err(io_error("close dir"))?;
        volume0.close().map_err(io_error("close volume"))?;

        debug!("[SD] Volume 0 mounted");
        Ok(())
    }

    fn append(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.open_file_with(name, Mode::ReadWriteCreateOrAppend, data)
    }

    fn write(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.open_file_with(name, Mode::ReadWriteCreateOrTruncate, data)
    }

    fn read_at(
        &mut self,
        name: &'static str,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(io_error("open volume"))?;
        let root_dir = volume0.open_root_dir().map_err(io_error("open root dir"))?;
        let file = match root_dir.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(SdmmcError::NotFound) => return Err(StorageError::NotFound { name }),
            Err(e) => return Err(io_error("open file")(e)),
        };

        file.seek_from_start(offset).map_err(io_error("seek"))?;

        let mut filled = 0;
        while filled < buf.len() {
            let read = file.read(&mut buf[filled..]).map_err(io_error("read"))?;
            if read == 0 {
                break; // EOF
            }
            filled += read;
        }

        file.close().map_err(io_error("close file"))?;
        root_dir.close().map_err(io_error("close dir"))?;
        volume0.close().map_err(io_error("close volume"))?;

        Ok(filled)
    }

    fn size(&mut self, name: &'static str) -> Result<Option<u32>, StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(io_error("open volume"))?;
        let root_dir = volume0.open_root_dir().map_err(io_error("open root dir"))?;

        let size = match root_dir.find_directory_entry(name) {
            Ok(entry) => Some(entry.size),
            Err(SdmmcError::NotFound) => None,
            Err(e) => return Err(io_error("stat")(e)),
        };

        root_dir.close().map_err(io_error("close dir"))?;
        volume0.close().map_err(io_error("close volume"))?;

        Ok(size)
    }

    fn remove(&mut self, name: &'static str) -> Result<(), StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(io_error("open volume"))?;
        let root_dir = volume0.open_root_dir().map_err(io_error("open root dir"))?;

        match root_dir.delete_file_in_dir(name) {
            Ok(()) | Err(SdmmcError::NotFound) => {}
            Err(e) => return Err(io_error("delete")(e)),
        }

        root_dir.close().map_err(io_error("close dir"))?;
        volume0.close().map_err(io_error("close volume"))?;

        Ok(())
    }
}
