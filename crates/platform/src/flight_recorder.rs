//! Flight recorder (circular event log) seam.

/// Read side of a flight recorder, as seen from panic mode.
///
/// The panic path switches live logging off before taking the buffer, so
/// the returned slice is a stable snapshot for the rest of the sequence.
pub trait FlightRecorder {
    /// Enable or disable appending new events. Disabling keeps the contents.
    fn set_logging_enabled(&mut self, enabled: bool);

    /// The raw recorder bytes, including any header the recorder keeps.
    fn buffer(&self) -> &[u8];
}
