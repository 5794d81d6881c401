//! Panic controller: the two fault entry points and the common handler.
//!
//! # Entry points
//!
//! - [`PanicController::fault_detected`]: software entry, e.g. from the
//!   watchdog supervisor. Records the return address into the caller and its
//!   own SP, then moves onto the panic stack at the top of RAM before doing
//!   anything else.
//! - [`PanicController::exception_entry`]: hardware entry. The low-level
//!   exception trampoline has already switched to the panic stack and passes
//!   the faulting stack pointer and `EXC_RETURN` explicitly.
//!
//! # Common handler
//!
//! Strictly sequential, never returns:
//!
//! ```text
//! Armed ──entry──▶ Collecting ──▶ Persisting ──▶ Resetting ──▶ system reset
//! ```
//!
//! Nothing in here logs through defmt or tracing, allocates, or waits on an
//! interrupt. Store failures are reported on the polling console and the
//! sequence carries on to the reset.

use core::fmt::Write as _;

use embedded_storage::nor_flash::NorFlash;
use heapless::String;
use platform::cpu::{ExceptionFrame, PanicCpu};
use platform::memory_map::DTCM_END;
use platform::{
    FlightRecorder, HardwareWatchdog, MillisClock, PollingConsole, RamBounds,
    WatchdogClientId, WatchdogTriggerHandler,
};

use super::collector::DiagnosticCollector;
use super::record::{EndMarker, FaultKind, FaultRecord, RECORD_LEN};
use super::store::{PanicStore, PanicStoreConfig, StoreError};

/// The concrete collaborators of one board.
pub trait PanicBoard {
    /// Processor boundary.
    type Cpu: PanicCpu;
    /// Independent watchdog reload.
    type Watchdog: HardwareWatchdog;
    /// Event log frozen and dumped at panic time.
    type Recorder: FlightRecorder;
    /// Millisecond tick.
    type Clock: MillisClock;
    /// Interrupt-free text output.
    type Console: PollingConsole;
    /// Polling flash driver holding the panic region.
    type Flash: NorFlash;
}

/// Everything the panic path drives except the flash, which the store owns.
pub struct PanicParts<B: PanicBoard> {
    /// Processor boundary.
    pub cpu: B::Cpu,
    /// Independent watchdog reload.
    pub watchdog: B::Watchdog,
    /// Flight recorder.
    pub recorder: B::Recorder,
    /// Millisecond tick.
    pub clock: B::Clock,
    /// Polling console.
    pub console: B::Console,
}

/// Static configuration of the panic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanicConfig {
    /// RAM a captured exception frame must lie in.
    pub ram: RamBounds,
    /// Stack pointer loaded before the common handler runs.
    pub panic_stack_top: u32,
    /// Where the dump goes.
    pub store: PanicStoreConfig,
}

impl PanicConfig {
    /// DTCM bounds, panic stack at the top of DTCM, store per features.
    pub const fn board_default() -> Self {
        Self {
            ram: RamBounds::DTCM,
            panic_stack_top: DTCM_END,
            store: PanicStoreConfig::board_default(),
        }
    }
}

/// Progress of the panic sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanicPhase {
    /// Installed, no fault yet.
    Armed,
    /// Reading processor state into the record.
    Collecting,
    /// Writing record, recorder bytes and end marker.
    Persisting,
    /// Reset requested.
    Resetting,
}

/// Owns the fault record and every collaborator of the panic path.
pub struct PanicController<B: PanicBoard> {
    parts: PanicParts<B>,
    store: PanicStore<B::Flash>,
    collector: DiagnosticCollector,
    panic_stack_top: u32,
    record: FaultRecord,
    phase: PanicPhase,
}

impl<B: PanicBoard> PanicController<B> {
    /// Controller in the [`PanicPhase::Armed`] state.
    pub fn new(parts: PanicParts<B>, flash: B::Flash, config: PanicConfig) -> Self {
        Self {
            parts,
            store: PanicStore::new(flash, config.store),
            collector: DiagnosticCollector::new(config.ram),
            panic_stack_top: config.panic_stack_top,
            record: FaultRecord::EMPTY,
            phase: PanicPhase::Armed,
        }
    }

    /// Record as built so far.
    pub fn record(&self) -> &FaultRecord {
        &self.record
    }

    /// Current phase.
    pub fn phase(&self) -> PanicPhase {
        self.phase
    }

    /// Collaborators, for inspection after a sequence.
    pub fn parts(&self) -> &PanicParts<B> {
        &self.parts
    }

    /// Persistent store, for inspection after a sequence.
    pub fn store(&self) -> &PanicStore<B::Flash> {
        &self.store
    }

    /// Software fault entry.
    ///
    /// Kept out of line so the recorded LR is the return address into the
    /// caller. Nothing before the register reads makes a call (the board's
    /// `disable_interrupts` and reads are inlined), so LR still holds it.
    /// The recorded SP is this function's, after its prologue: the caller's
    /// SP minus the few words the prologue pushes.
    #[inline(never)]
    pub fn fault_detected(&mut self, kind: FaultKind, param: u32) -> ! {
        self.parts.cpu.disable_interrupts();
        let lr = self.parts.cpu.read_link_register();
        let sp = self.parts.cpu.read_stack_pointer();
        self.parts.watchdog.feed_hardware();
        self.parts.cpu.disable_mpu();

        self.record.fault_kind = kind;
        self.record.fault_param = param;
        self.record.exception_frame = ExceptionFrame::ZERO;
        self.record.link_register_at_fault = lr;
        self.record.stack_pointer_at_fault = sp;

        let top = self.panic_stack_top;
        let this: *mut Self = self;
        // SAFETY: the controller lives in static storage (it was installed in
        // a `PanicSlot` as `&'static mut`), so `this` stays valid after the
        // old stack is abandoned, and `resume_on_panic_stack` never returns.
        // No borrow of `self` is held across the switch.
        unsafe {
            <B::Cpu as PanicCpu>::switch_stack_to(top, this.cast(), Self::resume_on_panic_stack)
        }
    }

    /// Hardware fault entry, already running on the panic stack.
    ///
    /// `frame_sp` is the stack pointer the processor stacked the exception
    /// frame on; `exc_return` is the `EXC_RETURN` value from LR.
    pub fn exception_entry(&mut self, frame_sp: u32, exc_return: u32) -> ! {
        self.parts.cpu.disable_interrupts();
        self.parts.watchdog.feed_hardware();
        self.parts.cpu.disable_mpu();

        self.record.fault_kind = FaultKind::ProcessorException;
        self.record.fault_param = self.parts.cpu.active_exception();
        self.record.stack_pointer_at_fault = frame_sp;
        self.record.link_register_at_fault = exc_return;
        self.record.exception_frame = self
            .collector
            .capture_exception_frame(&self.parts.cpu, frame_sp);

        self.common_handler()
    }

    unsafe extern "C-unwind" fn resume_on_panic_stack(this: *mut ()) -> ! {
        // SAFETY: `fault_detected` passes a pointer to itself, which outlives
        // the old stack and is not otherwise borrowed once the switch happens.
        let this = unsafe { &mut *this.cast::<Self>() };
        this.common_handler()
    }

    fn common_handler(&mut self) -> ! {
        self.phase = PanicPhase::Collecting;
        self.parts.recorder.set_logging_enabled(false);
        self.announce();
        self.record.stamp();
        self.collector
            .collect(&self.parts.cpu, &self.parts.clock, &mut self.record);

        self.phase = PanicPhase::Persisting;
        self.persist();

        self.phase = PanicPhase::Resetting;
        self.parts.cpu.system_reset()
    }

    fn announce(&mut self) {
        let mut line: String<64> = String::new();
        let _ = write!(
            line,
            "Fault type={} ({}) param={}",
            self.record.fault_kind.as_u32(),
            self.record.fault_kind.name(),
            self.record.fault_param
        );
        self.parts.console.write_line_polling(&line);
    }

    fn persist(&mut self) {
        let Self {
            parts,
            store,
            record,
            ..
        } = self;
        let encoded = record.encode();
        let snapshot = parts.recorder.buffer();
        let recorder_len = snapshot.len().min(store.config().recorder_capacity());
        let recorder = snapshot.get(..recorder_len).unwrap_or(&[]);

        #[allow(clippy::cast_possible_truncation)] // both bounded by the region size (u32)
        let (recorder_offset, marker_offset) =
            (RECORD_LEN as u32, (RECORD_LEN.saturating_add(recorder_len)) as u32);

        if let Err(e) = store.write(0, &encoded, &mut parts.watchdog, &mut parts.console) {
            report(&mut parts.console, e);
        }
        if let Err(e) = store.write(
            recorder_offset,
            recorder,
            &mut parts.watchdog,
            &mut parts.console,
        ) {
            report(&mut parts.console, e);
        }
        if let Err(e) = store.write(
            marker_offset,
            &EndMarker.encode(),
            &mut parts.watchdog,
            &mut parts.console,
        ) {
            report(&mut parts.console, e);
        }
        if let Err(e) = store.finish(&mut parts.watchdog) {
            report(&mut parts.console, e);
        }
    }
}

fn report<S: PollingConsole>(console: &mut S, error: StoreError) {
    let mut line: String<80> = String::new();
    let _ = write!(line, "panic store: {error}");
    console.write_line_polling(&line);
}

impl<B: PanicBoard> WatchdogTriggerHandler for PanicController<B> {
    fn on_watchdog_trigger(&mut self, client: WatchdogClientId) -> ! {
        self.fault_detected(FaultKind::WatchdogTimeout, client.0)
    }
}
