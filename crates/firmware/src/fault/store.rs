//! Persistent store for the panic path.
//!
//! The panic sequence calls [`PanicStore::write`] three times at increasing
//! offsets (record, flight-recorder bytes, end marker) and then
//! [`PanicStore::finish`]. Each call goes to up to two sinks, enabled
//! independently by [`PanicStoreConfig`]:
//!
//! - **flash**: the reserved region of a polling [`NorFlash`] driver. The call
//!   at offset 0 decides the fate of the whole sequence: if the region already
//!   starts with [`FAULT_RECORD_MAGIC`] it is left byte-identical, otherwise it
//!   is erased once and the bytes are streamed in `WRITE_SIZE` granules.
//! - **console**: a hex dump over the polling console, `OOOOOOOO: ` offset
//!   prefix and 32 bytes per line.
//!
//! The hardware watchdog is fed around the erase and after every programmed
//! granule.

use core::fmt::Write as _;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};
use heapless::String;
use platform::memory_map::{PANIC_REGION_OFFSET, PANIC_REGION_SIZE};
use platform::{HardwareWatchdog, PollingConsole};

use super::record::{END_MARKER_LEN, FAULT_RECORD_MAGIC, RECORD_LEN};

/// Largest flash write granule the store can stage.
pub const STAGING_BYTES: usize = 64;

/// Bytes per line of the console hex dump.
pub const HEX_BYTES_PER_LINE: usize = 32;

/// `"OOOOOOOO: "` plus two hex digits per byte.
pub const HEX_LINE_CAPACITY: usize = 10 + 2 * HEX_BYTES_PER_LINE;

/// Where and how the panic path persists its dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanicStoreConfig {
    /// Write the dump to the reserved flash region.
    pub to_flash: bool,
    /// Hex-dump every write to the polling console.
    pub to_console: bool,
    /// Region start, as a driver offset. Must be erase-aligned.
    pub region_offset: u32,
    /// Region length in bytes. Must be a multiple of the erase size.
    pub region_size: u32,
}

impl PanicStoreConfig {
    /// Both sinks enabled over `[region_offset, region_offset + region_size)`.
    pub const fn new(region_offset: u32, region_size: u32) -> Self {
        Self {
            to_flash: true,
            to_console: true,
            region_offset,
            region_size,
        }
    }

    /// Last flash sector, sinks selected by the `panic-to-flash` and
    /// `panic-to-console` features.
    pub const fn board_default() -> Self {
        Self {
            to_flash: cfg!(feature = "panic-to-flash"),
            to_console: cfg!(feature = "panic-to-console"),
            region_offset: PANIC_REGION_OFFSET,
            region_size: PANIC_REGION_SIZE,
        }
    }

    /// Flight-recorder bytes that fit between the record and the end marker.
    pub const fn recorder_capacity(&self) -> usize {
        (self.region_size as usize)
            .saturating_sub(RECORD_LEN)
            .saturating_sub(END_MARKER_LEN)
    }
}

/// Persistent-store failure. The panic path reports these and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum StoreError {
    /// Reading the region head failed.
    #[error("flash read failed: {0}")]
    Read(FlashFault),
    /// Erasing the region failed.
    #[error("flash erase failed: {0}")]
    Erase(FlashFault),
    /// Programming a granule failed.
    #[error("flash write failed: {0}")]
    Write(FlashFault),
    /// Sections must be written back to back starting at offset 0.
    #[error("write at offset {offset}, expected {expected}")]
    OutOfOrder {
        /// Offset passed by the caller.
        offset: u32,
        /// Next offset the stream can accept.
        expected: u32,
    },
    /// The section would end past the reserved region.
    #[error("section ends past the {size}-byte region")]
    RegionOverflow {
        /// Region size in bytes.
        size: u32,
    },
    /// The driver's write granule does not fit the staging buffer.
    #[error("flash write granule of {0} bytes is not supported")]
    UnsupportedWriteSize(usize),
}

/// A NOR flash driver error, reduced to its portable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashFault(pub NorFlashErrorKind);

impl<E: NorFlashError> From<E> for FlashFault {
    fn from(e: E) -> Self {
        Self(e.kind())
    }
}

impl core::fmt::Display for FlashFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self.0 {
            NorFlashErrorKind::NotAligned => "not aligned",
            NorFlashErrorKind::OutOfBounds => "out of bounds",
            _ => "device error",
        })
    }
}

/// Flash side of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashState {
    /// No sequence started yet, or flash output disabled.
    Idle,
    /// Region erased, bytes are being streamed.
    Recording,
    /// A previous fault is in the region; this sequence leaves it alone.
    Preserving,
    /// A flash operation failed; the rest of the sequence skips flash.
    Failed,
}

/// Streams the panic dump into flash and/or the console.
pub struct PanicStore<F: NorFlash> {
    flash: F,
    config: PanicStoreConfig,
    state: FlashState,
    /// Bytes accepted so far in this sequence.
    cursor: u32,
    /// Bytes already programmed; always a multiple of `F::WRITE_SIZE`.
    programmed: u32,
    staging: [u8; STAGING_BYTES],
    staged: usize,
}

impl<F: NorFlash> PanicStore<F> {
    /// Store over `flash` with the given configuration.
    pub fn new(flash: F, config: PanicStoreConfig) -> Self {
        Self {
            flash,
            config,
            state: FlashState::Idle,
            cursor: 0,
            programmed: 0,
            staging: [0xFF; STAGING_BYTES],
            staged: 0,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &PanicStoreConfig {
        &self.config
    }

    /// Flash side of the current sequence.
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Underlying driver.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Underlying driver, mutably.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Write `data` at `offset` within the dump.
    ///
    /// Offset 0 starts a new sequence. Later offsets must continue exactly
    /// where the previous call ended.
    pub fn write<W, S>(
        &mut self,
        offset: u32,
        data: &[u8],
        watchdog: &mut W,
        console: &mut S,
    ) -> Result<(), StoreError>
    where
        W: HardwareWatchdog,
        S: PollingConsole,
    {
        if self.config.to_console {
            hex_dump(console, offset, data);
        }
        if !self.config.to_flash {
            return Ok(());
        }
        if offset == 0 {
            self.begin(watchdog)?;
        }
        if self.state != FlashState::Recording {
            return Ok(());
        }
        self.stream(offset, data, watchdog)
    }

    /// Program any partially filled granule, padded with erased bytes.
    pub fn finish<W: HardwareWatchdog>(&mut self, watchdog: &mut W) -> Result<(), StoreError> {
        if self.state != FlashState::Recording || self.staged == 0 {
            return Ok(());
        }
        if let Some(tail) = self.staging.get_mut(self.staged..F::WRITE_SIZE) {
            tail.fill(0xFF);
        }
        self.program_granule(watchdog)
    }

    fn begin<W: HardwareWatchdog>(&mut self, watchdog: &mut W) -> Result<(), StoreError> {
        self.cursor = 0;
        self.programmed = 0;
        self.staged = 0;

        if F::WRITE_SIZE == 0 || F::WRITE_SIZE > STAGING_BYTES {
            self.state = FlashState::Failed;
            return Err(StoreError::UnsupportedWriteSize(F::WRITE_SIZE));
        }

        let mut head = [0u8; 4];
        if let Err(e) = self.flash.read(self.config.region_offset, &mut head) {
            self.state = FlashState::Failed;
            return Err(StoreError::Read(e.into()));
        }
        if u32::from_le_bytes(head) == FAULT_RECORD_MAGIC {
            self.state = FlashState::Preserving;
            return Ok(());
        }

        let Some(end) = self
            .config
            .region_offset
            .checked_add(self.config.region_size)
        else {
            self.state = FlashState::Failed;
            return Err(StoreError::RegionOverflow {
                size: self.config.region_size,
            });
        };
        watchdog.feed_hardware();
        let erased = self.flash.erase(self.config.region_offset, end);
        watchdog.feed_hardware();
        if let Err(e) = erased {
            self.state = FlashState::Failed;
            return Err(StoreError::Erase(e.into()));
        }
        self.state = FlashState::Recording;
        Ok(())
    }

    fn stream<W: HardwareWatchdog>(
        &mut self,
        offset: u32,
        data: &[u8],
        watchdog: &mut W,
    ) -> Result<(), StoreError> {
        if offset != self.cursor {
            return Err(StoreError::OutOfOrder {
                offset,
                expected: self.cursor,
            });
        }
        let overflow = StoreError::RegionOverflow {
            size: self.config.region_size,
        };
        let end = u32::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|end| *end <= self.config.region_size)
            .ok_or(overflow)?;

        for &byte in data {
            if let Some(slot) = self.staging.get_mut(self.staged) {
                *slot = byte;
            }
            #[allow(clippy::arithmetic_side_effects)] // staged < WRITE_SIZE <= STAGING_BYTES
            {
                self.staged += 1;
            }
            if self.staged == F::WRITE_SIZE {
                self.program_granule(watchdog)?;
            }
        }
        self.cursor = end;
        Ok(())
    }

    fn program_granule<W: HardwareWatchdog>(&mut self, watchdog: &mut W) -> Result<(), StoreError> {
        let granule = self.staging.get(..F::WRITE_SIZE).unwrap_or(&[]);
        // programmed + WRITE_SIZE <= region_size: stream() bounds every byte
        // staged to the region, and finish() pads at most one granule.
        #[allow(clippy::arithmetic_side_effects)]
        let address = self.config.region_offset + self.programmed;
        let result = self.flash.write(address, granule);
        #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
        {
            self.programmed += F::WRITE_SIZE as u32;
        }
        self.staged = 0;
        watchdog.feed_hardware();
        result.map_err(|e| {
            self.state = FlashState::Failed;
            StoreError::Write(e.into())
        })
    }
}

/// Hex-dump `data` starting at dump offset `offset`, one line per 32 bytes.
pub fn hex_dump<S: PollingConsole>(console: &mut S, offset: u32, data: &[u8]) {
    let mut line_offset = offset;
    for chunk in data.chunks(HEX_BYTES_PER_LINE) {
        console.write_line_polling(&hex_line(line_offset, chunk));
        #[allow(clippy::cast_possible_truncation)] // chunk.len() <= 32
        {
            line_offset = line_offset.wrapping_add(chunk.len() as u32);
        }
    }
}

/// One dump line: `OOOOOOOO: ` followed by `chunk` in hex, no separators.
///
/// Bytes past [`HEX_BYTES_PER_LINE`] are dropped.
pub fn hex_line(offset: u32, chunk: &[u8]) -> String<HEX_LINE_CAPACITY> {
    let mut line = String::new();
    // Capacity covers a full line, so these writes cannot fail.
    let _ = write!(line, "{offset:08x}: ");
    for byte in chunk.iter().take(HEX_BYTES_PER_LINE) {
        let _ = write!(line, "{byte:02x}");
    }
    line
}
