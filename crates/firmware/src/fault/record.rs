//! Binary layout of the persisted fault record and end marker.
//!
//! All words are little-endian `u32`. The record is 96 bytes so that it fills
//! exactly three 32-byte flash words on the H7.
//!
//! ```text
//! [0..4]    magic                    FAULT_RECORD_MAGIC
//! [4..8]    record_size              RECORD_LEN
//! [8..12]   fault_kind               1 = watchdog timeout, 2 = processor exception
//! [12..16]  fault_param              watchdog client id / exception number
//! [16..48]  exception_frame          r0 r1 r2 r3 r12 lr pc xpsr
//! [48..52]  stack_pointer_at_fault
//! [52..56]  link_register_at_fault
//! [56..84]  ipsr icsr shcsr cfsr hfsr mmfar bfar
//! [84..88]  timestamp_ms
//! [88..96]  reserved (zero)
//! ```

use platform::cpu::{ExceptionFrame, FaultStatusRegisters, EXCEPTION_FRAME_WORDS};

/// First word of a valid fault record.
pub const FAULT_RECORD_MAGIC: u32 = 0xFA17_DA7A;

/// First word of the end marker written after the flight-recorder bytes.
pub const END_MARKER_MAGIC: u32 = 0xE0D0_E0D0;

/// Encoded length of [`FaultRecord`] in bytes.
pub const RECORD_LEN: usize = 96;

/// Encoded length of [`EndMarker`] in bytes.
pub const END_MARKER_LEN: usize = 8;

const RECORD_WORDS: usize = RECORD_LEN / 4;
const FRAME_WORD: usize = 4;
const SP_WORD: usize = 12;
const STATUS_WORD: usize = 14;
const TIMESTAMP_WORD: usize = 21;

/// Why the panic path was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FaultKind {
    /// A software watchdog client stopped feeding.
    WatchdogTimeout = 1,
    /// The processor raised an exception (HardFault, MemManage, ...).
    ProcessorException = 2,
}

impl FaultKind {
    /// Wire value.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a wire value.
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::WatchdogTimeout),
            2 => Some(Self::ProcessorException),
            _ => None,
        }
    }

    /// Short label for console output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::WatchdogTimeout => "watchdog",
            Self::ProcessorException => "exception",
        }
    }
}

/// Diagnostic snapshot taken by the panic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRecord {
    /// [`FAULT_RECORD_MAGIC`] once stamped by the panic path.
    pub magic: u32,
    /// Encoded size, [`RECORD_LEN`] once stamped.
    pub record_size: u32,
    /// Entry cause.
    pub fault_kind: FaultKind,
    /// Watchdog client id or exception number.
    pub fault_param: u32,
    /// Hardware-stacked registers, all zero when not captured.
    pub exception_frame: ExceptionFrame,
    /// SP at the moment of entry (the frame address for exceptions).
    pub stack_pointer_at_fault: u32,
    /// LR at the moment of entry (`EXC_RETURN` for exceptions).
    pub link_register_at_fault: u32,
    /// SCB fault and status registers.
    pub status: FaultStatusRegisters,
    /// Milliseconds since boot.
    pub timestamp_ms: u32,
}

/// Failure to decode a [`FaultRecord`] from bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Fewer than [`RECORD_LEN`] bytes.
    #[error("record truncated: {0} of 96 bytes")]
    Truncated(usize),
    /// First word is not [`FAULT_RECORD_MAGIC`].
    #[error("bad record magic {0:#010x}")]
    BadMagic(u32),
    /// `fault_kind` holds an unknown value.
    #[error("unknown fault kind {0}")]
    UnknownKind(u32),
}

impl FaultRecord {
    /// Unstamped record, as owned by the controller before any fault.
    pub const EMPTY: Self = Self {
        magic: 0,
        record_size: 0,
        fault_kind: FaultKind::ProcessorException,
        fault_param: 0,
        exception_frame: ExceptionFrame::ZERO,
        stack_pointer_at_fault: 0,
        link_register_at_fault: 0,
        status: FaultStatusRegisters {
            ipsr: 0,
            icsr: 0,
            shcsr: 0,
            cfsr: 0,
            hfsr: 0,
            mmfar: 0,
            bfar: 0,
        },
        timestamp_ms: 0,
    };

    /// Set magic and size so the encoded record is recognised as valid.
    pub fn stamp(&mut self) {
        self.magic = FAULT_RECORD_MAGIC;
        #[allow(clippy::cast_possible_truncation)] // 96 fits u32
        let size = RECORD_LEN as u32;
        self.record_size = size;
    }

    fn to_words(&self) -> [u32; RECORD_WORDS] {
        let s = &self.status;
        let f = self.exception_frame.to_words();
        [
            self.magic,
            self.record_size,
            self.fault_kind.as_u32(),
            self.fault_param,
            f[0],
            f[1],
            f[2],
            f[3],
            f[4],
            f[5],
            f[6],
            f[7],
            self.stack_pointer_at_fault,
            self.link_register_at_fault,
            s.ipsr,
            s.icsr,
            s.shcsr,
            s.cfsr,
            s.hfsr,
            s.mmfar,
            s.bfar,
            self.timestamp_ms,
            0,
            0,
        ]
    }

    /// Encode into the fixed 96-byte layout.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        for (chunk, word) in buf.chunks_exact_mut(4).zip(self.to_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Decode from the start of `bytes`.
    ///
    /// # Safety (lint allow)
    /// All word indices are constants below `RECORD_WORDS`, and `bytes` is
    /// length-checked before any word is read.
    #[allow(clippy::indexing_slicing)]
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let body = bytes
            .get(..RECORD_LEN)
            .ok_or(RecordError::Truncated(bytes.len()))?;
        let mut w = [0u32; RECORD_WORDS];
        for (word, chunk) in w.iter_mut().zip(body.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        if w[0] != FAULT_RECORD_MAGIC {
            return Err(RecordError::BadMagic(w[0]));
        }
        let fault_kind = FaultKind::from_u32(w[2]).ok_or(RecordError::UnknownKind(w[2]))?;
        let mut frame = [0u32; EXCEPTION_FRAME_WORDS];
        frame.copy_from_slice(&w[FRAME_WORD..FRAME_WORD + EXCEPTION_FRAME_WORDS]);
        Ok(Self {
            magic: w[0],
            record_size: w[1],
            fault_kind,
            fault_param: w[3],
            exception_frame: ExceptionFrame::from_words(frame),
            stack_pointer_at_fault: w[SP_WORD],
            link_register_at_fault: w[SP_WORD + 1],
            status: FaultStatusRegisters {
                ipsr: w[STATUS_WORD],
                icsr: w[STATUS_WORD + 1],
                shcsr: w[STATUS_WORD + 2],
                cfsr: w[STATUS_WORD + 3],
                hfsr: w[STATUS_WORD + 4],
                mmfar: w[STATUS_WORD + 5],
                bfar: w[STATUS_WORD + 6],
            },
            timestamp_ms: w[TIMESTAMP_WORD],
        })
    }
}

impl Default for FaultRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Terminates the persisted dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndMarker;

impl EndMarker {
    /// `magic` followed by a zero payload length.
    #[must_use]
    #[allow(clippy::indexing_slicing)] // constant ranges inside an 8-byte array
    pub fn encode(self) -> [u8; END_MARKER_LEN] {
        let mut buf = [0u8; END_MARKER_LEN];
        buf[0..4].copy_from_slice(&END_MARKER_MAGIC.to_le_bytes());
        buf
    }
}
