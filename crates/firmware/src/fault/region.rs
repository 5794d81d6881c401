//! Normal-mode access to the panic region: the operator read path.
//!
//! Read-only queries for the stored record and flight-recorder bytes, plus
//! the explicit clear that makes room for the next fault.

use embedded_storage::nor_flash::NorFlash;

use super::dump::{find_end_marker, DumpError};
use super::record::{FaultRecord, RecordError, FAULT_RECORD_MAGIC, RECORD_LEN};
use super::store::{FlashFault, PanicStoreConfig, StoreError};

/// Operator access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum RegionError {
    /// The flash driver failed.
    #[error("{0}")]
    Store(StoreError),
    /// The stored bytes do not decode.
    #[error("{0}")]
    Dump(DumpError),
}

impl From<StoreError> for RegionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<DumpError> for RegionError {
    fn from(e: DumpError) -> Self {
        Self::Dump(e)
    }
}

/// The reserved flash region, seen from normal mode.
pub struct FaultRegion<F> {
    flash: F,
    offset: u32,
    size: u32,
}

impl<F: NorFlash> FaultRegion<F> {
    /// Region described by `config` on `flash`.
    pub fn new(flash: F, config: &PanicStoreConfig) -> Self {
        Self {
            flash,
            offset: config.region_offset,
            size: config.region_size,
        }
    }

    /// Region length in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Underlying driver.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Read `buf.len()` bytes starting `at` bytes into the region.
    pub fn read(&mut self, at: u32, buf: &mut [u8]) -> Result<(), StoreError> {
        let overflow = StoreError::RegionOverflow { size: self.size };
        let fits = u32::try_from(buf.len())
            .ok()
            .and_then(|len| at.checked_add(len))
            .is_some_and(|end| end <= self.size);
        if !fits {
            return Err(overflow);
        }
        let address = self.offset.checked_add(at).ok_or(overflow)?;
        self.flash
            .read(address, buf)
            .map_err(|e| StoreError::Read(FlashFault::from(e)))
    }

    /// A record with a valid magic is present.
    pub fn has_fault(&mut self) -> Result<bool, StoreError> {
        let mut head = [0u8; 4];
        self.read(0, &mut head)?;
        Ok(u32::from_le_bytes(head) == FAULT_RECORD_MAGIC)
    }

    /// The stored record, or `None` when the region holds no fault.
    pub fn read_record(&mut self) -> Result<Option<FaultRecord>, RegionError> {
        let mut raw = [0u8; RECORD_LEN];
        self.read(0, &mut raw)?;
        match FaultRecord::decode(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(RecordError::BadMagic(_)) => Ok(None),
            Err(e) => Err(DumpError::BadRecord(e).into()),
        }
    }

    /// Copy the stored flight-recorder bytes into `out`; returns their length.
    ///
    /// `out` must hold the recorder bytes plus the end marker.
    pub fn read_recorder(&mut self, out: &mut [u8]) -> Result<usize, RegionError> {
        let Some(record) = self.read_record()? else {
            return Err(DumpError::NoFault.into());
        };
        let available = (self.size as usize).saturating_sub(record.record_size as usize);
        let len = out.len().min(available);
        let window = out.get_mut(..len).unwrap_or(&mut []);
        self.read(record.record_size, window)?;
        find_end_marker(window).ok_or_else(|| DumpError::MissingEndMarker.into())
    }

    /// Erase the whole region.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        let end = self
            .offset
            .checked_add(self.size)
            .ok_or(StoreError::RegionOverflow { size: self.size })?;
        self.flash
            .erase(self.offset, end)
            .map_err(|e| StoreError::Erase(FlashFault::from(e)))
    }
}
