//! MPU (Memory Protection Unit) stack guard for STM32H743 / Cortex-M7
//!
//! # Purpose
//!
//! The main stack grows down towards the end of static data. A 32-byte
//! read-only MPU region placed directly below the stack turns an overflow into
//! an immediate MemManage fault instead of silent corruption of `.bss`. The
//! fault then reaches the panic path like any other processor exception.
//!
//! The panic path disables the MPU before it touches memory, so the guard can
//! never block the fault handler itself.
//!
//! # References
//!
//! - ARM Cortex-M7 TRM DDI0489F: MPU Region Attribute and Size Register
//! - ST AN4838: Introduction to MPU Management on STM32 MCUs
//!
//! # MPU Region Requirements (Cortex-M7, ARM DDI0489F §B3.5)
//!
//! - Minimum region size: **32 bytes** (SIZE field = 4)
//! - Size must be a **power of 2**
//! - Base address must be **aligned to the region size**
//! - ARM MPU SIZE field encoding: `SIZE = log2(size_bytes) − 1`
//!   - 32 B   → SIZE = 4  (2^5, trailing_zeros = 5, 5 − 1 = 4)
//!   - 1 KB   → SIZE = 9  (2^10, trailing_zeros = 10, 10 − 1 = 9)

use crate::memory_map::STACK_GUARD_BYTES;

/// MPU configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MpuError {
    /// Region size is not a power of two (ARM MPU requirement: §B3.5 DDI0489F).
    SizeNotPowerOfTwo,
    /// Region size is zero.
    SizeZero,
    /// Base address is not aligned to the region size.
    ///
    /// ARM requires: `base_addr % size == 0`.
    AddressMisaligned,
    /// Region size is below the minimum 32-byte floor imposed by Cortex-M7 MPU.
    SizeTooSmall,
}

/// A validated MPU region descriptor.
///
/// Construction via [`MpuRegion::new`] enforces the ARM Cortex-M7 MPU
/// alignment and size invariants so that callers cannot produce an invalid
/// hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpuRegion {
    base: u32,
    size: u32,
}

impl MpuRegion {
    /// Create a new MPU region, validating size and alignment.
    ///
    /// # Errors
    ///
    /// - [`MpuError::SizeZero`] if `size == 0`
    /// - [`MpuError::SizeTooSmall`] if `size < 32` (Cortex-M7 minimum)
    /// - [`MpuError::SizeNotPowerOfTwo`] if `size` is not a power of two
    /// - [`MpuError::AddressMisaligned`] if `base % size != 0`
    pub fn new(base: u32, size: u32) -> Result<Self, MpuError> {
        if size == 0 {
            return Err(MpuError::SizeZero);
        }
        if size < 32 {
            return Err(MpuError::SizeTooSmall);
        }
        if !size.is_power_of_two() {
            return Err(MpuError::SizeNotPowerOfTwo);
        }
        if !base.is_multiple_of(size) {
            return Err(MpuError::AddressMisaligned);
        }
        Ok(Self { base, size })
    }

    /// Encode the size as the ARM MPU `SIZE` field value (`log2(size) − 1`).
    ///
    /// # Errors
    ///
    /// - [`MpuError::SizeZero`] if `size == 0`
    /// - [`MpuError::SizeNotPowerOfTwo`] if `size` is not a power of two
    // trailing_zeros() returns u32; n fits in u8 for all valid MPU region sizes (≤ 2^31)
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_size(size: u32) -> Result<u8, MpuError> {
        if size == 0 {
            return Err(MpuError::SizeZero);
        }
        if !size.is_power_of_two() {
            return Err(MpuError::SizeNotPowerOfTwo);
        }
        let n = size.trailing_zeros();
        Ok((n as u8).saturating_sub(1))
    }

    /// Base address of this region.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size of this region in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Pure register-value computation for the stack guard region.
///
/// No `cortex_m` peripheral types are used here, so this is fully
/// host-testable. The firmware's boot code writes the values.
///
/// ## Guard region RASR encoding
///
/// Normal write-back memory (TEX=000, C=1, B=1), read-only at every privilege
/// level (AP=0b110), execute-never:
///
/// | Field | Bits    | Value | Hex contribution |
/// |-------|---------|-------|------------------|
/// | XN    | [28]    | 1     | 0x1000_0000      |
/// | AP    | [26:24] | 0b110 | 0x0600_0000      |
/// | C, B  | [17:16] | 0b11  | 0x0003_0000      |
///
/// A 32-byte region adds SIZE=4 (bits [5:1] = 0x08) and ENABLE: **0x1603_0009**.
pub struct MpuApplier;

impl MpuApplier {
    /// Attribute mask for a read-only, execute-never guard region.
    pub const GUARD_ATTR_MASK: u32 = 0x1603_0000;

    /// `MPU_CTRL` value: ENABLE with PRIVDEFENA so the default memory map
    /// stays in force outside programmed regions.
    pub const CTRL_ENABLE_PRIVDEFENA: u32 = 0b101;

    /// Hardware slot used for the stack guard.
    pub const GUARD_REGION_SLOT: u8 = 0;

    /// Compute the RASR value for a guard region of the given SIZE field.
    #[must_use]
    pub fn guard_rasr(size_field: u8) -> u32 {
        Self::GUARD_ATTR_MASK
            | (u32::from(size_field) << 1) // SIZE field occupies RASR bits [5:1]
            | 1 // ENABLE bit [0]
    }

    /// Compute the RBAR value for a region, with VALID=1 selecting `region_number`.
    #[must_use]
    pub fn rbar(base: u32, region_number: u8) -> u32 {
        base | (1 << 4) | (u32::from(region_number) & 0xF)
    }

    /// `(RBAR, RASR)` for a guard block starting at `guard_base`.
    ///
    /// # Errors
    ///
    /// Returns [`MpuError::AddressMisaligned`] if `guard_base` is not 32-byte aligned.
    pub fn stack_guard_pair(guard_base: u32) -> Result<(u32, u32), MpuError> {
        let region = MpuRegion::new(guard_base, STACK_GUARD_BYTES)?;
        let size = MpuRegion::encode_size(region.size())?;
        Ok((
            Self::rbar(region.base(), Self::GUARD_REGION_SLOT),
            Self::guard_rasr(size),
        ))
    }
}
