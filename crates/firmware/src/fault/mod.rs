//! Fault capture and recovery.
//!
//! An unrecoverable condition (a starved software watchdog or a processor
//! exception) enters the [`controller`], which freezes the machine into an
//! interrupt-free panic mode, fills a [`record::FaultRecord`] via the
//! [`collector`], persists record, flight-recorder bytes and an end marker
//! through the [`store`], and resets. After the reboot, [`region`] and
//! [`command`] give the operator read access to what was saved.
//!
//! ```text
//! supervisor ─┐                           ┌─▶ flash region (polling)
//!             ├─▶ PanicSlot ─▶ controller ┤
//! exception ──┘   (one-shot)   collector  └─▶ console hex dump (polling)
//! ```

pub mod collector;
pub mod command;
pub mod controller;
pub mod dump;
pub mod record;
pub mod region;
pub mod slot;
pub mod store;

pub use collector::DiagnosticCollector;
pub use controller::{PanicBoard, PanicConfig, PanicController, PanicParts, PanicPhase};
pub use dump::{DumpError, FaultDump};
pub use record::{EndMarker, FaultKind, FaultRecord, END_MARKER_LEN, RECORD_LEN};
pub use region::{FaultRegion, RegionError};
pub use slot::PanicSlot;
pub use store::{FlashState, PanicStore, PanicStoreConfig, StoreError};
