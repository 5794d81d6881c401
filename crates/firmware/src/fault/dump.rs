//! Parsing a persisted panic dump back into its parts.
//!
//! Used by the operator console and by `xtask decode` on the host. The input
//! is the panic region (or a prefix of it) as raw bytes.

use super::record::{FaultRecord, RecordError, END_MARKER_LEN, END_MARKER_MAGIC, RECORD_LEN};

/// Erased NOR flash.
const ERASED: u8 = 0xFF;

/// A decoded dump borrowing the recorder bytes from its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultDump<'a> {
    /// The fault record.
    pub record: FaultRecord,
    /// Flight-recorder bytes between the record and the end marker.
    pub recorder: &'a [u8],
    /// Bytes from the start of the record through the end marker.
    pub total_len: usize,
}

/// Why a dump could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DumpError {
    /// The region is erased: no fault has been recorded.
    #[error("no fault recorded")]
    NoFault,
    /// The record itself is unreadable.
    #[error("bad fault record: {0}")]
    BadRecord(RecordError),
    /// `record_size` points past the end of the input.
    #[error("record size {0} exceeds the dump")]
    BadRecordSize(u32),
    /// No end marker after the recorder bytes.
    #[error("end marker not found")]
    MissingEndMarker,
}

impl From<RecordError> for DumpError {
    fn from(e: RecordError) -> Self {
        Self::BadRecord(e)
    }
}

impl<'a> FaultDump<'a> {
    /// Decode `bytes`, which start at the beginning of the panic region.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DumpError> {
        if bytes.iter().take(4).all(|b| *b == ERASED) {
            return Err(DumpError::NoFault);
        }
        let record = FaultRecord::decode(bytes)?;
        let start = record.record_size as usize;
        if start < RECORD_LEN {
            return Err(DumpError::BadRecordSize(record.record_size));
        }
        let tail = bytes
            .get(start..)
            .ok_or(DumpError::BadRecordSize(record.record_size))?;
        let recorder_len = find_end_marker(tail).ok_or(DumpError::MissingEndMarker)?;
        Ok(Self {
            record,
            recorder: tail.get(..recorder_len).unwrap_or(&[]),
            total_len: start
                .saturating_add(recorder_len)
                .saturating_add(END_MARKER_LEN),
        })
    }
}

/// Offset of the end marker in `tail`.
///
/// The marker is the last thing written, so it must end exactly at the last
/// non-erased byte. Recorder bytes that happen to contain the marker pattern
/// are not mistaken for it.
pub fn find_end_marker(tail: &[u8]) -> Option<usize> {
    let last = tail.iter().rposition(|b| *b != ERASED)?;
    let at = last.checked_add(1)?.checked_sub(END_MARKER_LEN)?;
    let candidate = tail.get(at..at.checked_add(END_MARKER_LEN)?)?;
    let (magic, len) = candidate.split_at(4);
    (magic == END_MARKER_MAGIC.to_le_bytes() && len == [0u8; 4]).then_some(at)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::super::record::{EndMarker, FaultKind};
    use super::*;

    fn dump_with(recorder: &[u8], padding: usize) -> Vec<u8> {
        let mut r = FaultRecord {
            fault_kind: FaultKind::ProcessorException,
            fault_param: 3,
            ..FaultRecord::EMPTY
        };
        r.stamp();
        let mut out = r.encode().to_vec();
        out.extend_from_slice(recorder);
        out.extend_from_slice(&EndMarker.encode());
        out.resize(out.len() + padding, 0xFF);
        out
    }

    #[test]
    fn parses_record_and_recorder() {
        let bytes = dump_with(b"event-log", 100);
        let dump = FaultDump::parse(&bytes).unwrap();
        assert_eq!(dump.record.fault_param, 3);
        assert_eq!(dump.recorder, b"event-log");
        assert_eq!(dump.total_len, 96 + 9 + 8);
    }

    #[test]
    fn recorder_containing_marker_pattern_is_kept_whole() {
        let mut recorder = EndMarker.encode().to_vec();
        recorder.extend_from_slice(b"more");
        let bytes = dump_with(&recorder, 7);
        let dump = FaultDump::parse(&bytes).unwrap();
        assert_eq!(dump.recorder, &recorder[..]);
    }

    #[test]
    fn empty_recorder_is_allowed() {
        let bytes = dump_with(&[], 0);
        assert_eq!(FaultDump::parse(&bytes).unwrap().recorder, b"");
    }

    #[test]
    fn erased_region_means_no_fault() {
        assert_eq!(FaultDump::parse(&[0xFF; 256]), Err(DumpError::NoFault));
        assert_eq!(FaultDump::parse(&[]), Err(DumpError::NoFault));
    }

    #[test]
    fn missing_marker_is_reported() {
        let mut bytes = dump_with(b"abc", 0);
        let n = bytes.len();
        bytes.truncate(n - 8);
        assert_eq!(FaultDump::parse(&bytes), Err(DumpError::MissingEndMarker));
    }

    #[test]
    fn garbage_is_a_bad_record() {
        assert_eq!(
            FaultDump::parse(&[0u8; 128]),
            Err(DumpError::BadRecord(RecordError::BadMagic(0)))
        );
    }
}
