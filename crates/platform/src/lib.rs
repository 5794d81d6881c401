//! Hardware seams for the fault capture subsystem
//!
//! This crate provides trait-based abstractions for every collaborator the
//! panic path touches, so the fault core can be developed and tested on the
//! host without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: boot, main loop, console commands)
//!         ↓
//! Fault core (firmware::fault: controller, collector and store)
//!         ↓
//! Platform seams (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (cortex-m, embassy-stm32 blocking flash, raw registers)
//! ```
//!
//! # Seams
//!
//! - [`PanicCpu`] - the single `unsafe` processor boundary (LR/SP, stack switch,
//!   SCB fault registers, MPU, reset)
//! - [`HardwareWatchdog`] / [`WatchdogTriggerHandler`] - IWDG reload and the
//!   supervisor's timeout callback
//! - [`FlightRecorder`] - frozen event log read at panic time
//! - [`MillisClock`] - millisecond tick
//! - [`PollingConsole`] - interrupt-free text output
//! - [`ResetCauseRegister`] - sticky reset flags
//! - [`mpu`] - register values for the stack guard region
//! - Non-volatile storage is `embedded_storage::nor_flash::NorFlash`
//!
//! # Features
//!
//! - `std`: Enable standard library support and the [`mocks`] module
//! - `defmt`: Derive `defmt::Format` on platform types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(feature = "std")]
extern crate std;

pub mod clock;
pub mod console;
pub mod cpu;
pub mod flight_recorder;
pub mod memory_map;
pub mod mpu;
pub mod reset_cause;
pub mod watchdog;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use clock::MillisClock;
pub use console::PollingConsole;
pub use cpu::{ExceptionFrame, FaultStatusRegisters, PanicContinuation, PanicCpu};
pub use flight_recorder::FlightRecorder;
pub use memory_map::{RamBounds, StackBounds};
pub use reset_cause::{ResetCauseRegister, ResetFlags};
pub use watchdog::{HardwareWatchdog, WatchdogClientId, WatchdogTriggerHandler};
