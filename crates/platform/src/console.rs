//! Polling console output.

/// Blocking, interrupt-free text output.
///
/// Used from panic mode, so implementations must busy-wait on the
/// transmitter instead of relying on interrupts, DMA or a TX queue.
pub trait PollingConsole {
    /// Write `line` followed by `\r\n`.
    fn write_line_polling(&mut self, line: &str);
}

impl<T: PollingConsole + ?Sized> PollingConsole for &mut T {
    fn write_line_polling(&mut self, line: &str) {
        (**self).write_line_polling(line);
    }
}
