//! Fault capture and recovery firmware for the STM32H743.
//!
//! When the controller hits an unrecoverable condition (a starved software
//! watchdog or a processor exception) it freezes into an interrupt-free panic
//! mode, snapshots processor state into a fault record, persists record and
//! flight recorder to a reserved flash region exactly once, and resets. After
//! the reboot the operator console reads the dump back.
//!
//! # Architecture
//!
//! This firmware follows a layered architecture:
//!
//! ```text
//! Application Layer (main.rs: boot, supervisor loop, operator console)
//!         ↓
//! Fault core (fault: controller, collector, store, region, command)
//!         ↓
//! Support (watchdog supervisor, flight recorder, reset reason, stack watermark)
//!         ↓
//! HAL (hal module: cortex-m, raw registers, embassy blocking flash)
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for STM32H7 target (embassy, cortex-m, defmt)
//! - `std` - Host builds; routes crate logging through `tracing`
//! - `panic-to-flash` - Persist the dump to the reserved flash region
//! - `panic-to-console` - Hex-dump the record on the panic console
//!
//! # Examples
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```
//!
//! ## Host tests
//!
//! ```bash
//! cargo test -p firmware
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline (allow println in tests via clippy.toml)
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::unused_self)]
#![allow(clippy::unused_async)]

mod log;

pub mod boot;
pub mod exception_handlers;
pub mod fault;
pub mod flight_recorder;
pub mod reset_reason;
pub mod stack_watermark;
pub mod watchdog;

#[cfg(feature = "hardware")]
pub mod hal;

// Re-export key types
pub use fault::{
    FaultKind, FaultRecord, PanicBoard, PanicConfig, PanicController, PanicParts, PanicSlot,
    PanicStoreConfig,
};
pub use flight_recorder::RingRecorder;
pub use reset_reason::ResetReasonCache;
pub use stack_watermark::{StackMemory, StackWatermark};
pub use watchdog::{Supervisor, SupervisorConfig};
