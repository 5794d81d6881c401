//! Reset cause register (STM32H7 `RCC_RSR`).
//!
//! The flags are sticky across resets until software writes `RMVF`, so they
//! must be read and cleared exactly once per boot, before anything else can
//! clear them. `RMVF` is a plain read/write bit and the register is only
//! reset at power-on: while it stays 1 the flags are held at 0 and every
//! later reset would read as "no cause". Clearing is therefore a set followed
//! by a release, see [`ResetCauseRegister::clear`].
//!
//! | Bit | Flag        | Meaning |
//! |-----|-------------|---------|
//! | 30  | `LPWRRSTF`  | low-power reset |
//! | 28  | `WWDG1RSTF` | window watchdog |
//! | 26  | `IWDG1RSTF` | independent watchdog |
//! | 24  | `SFTRSTF`   | software reset (`SYSRESETREQ`) |
//! | 23  | `PORRSTF`   | power-on / power-down |
//! | 22  | `PINRSTF`   | NRST pin |
//! | 21  | `BORRSTF`   | brown-out |
//! | 20  | `D2RSTF`    | D2 domain power switch |
//! | 19  | `D1RSTF`    | D1 domain power switch |
//! | 17  | `CPURSTF`   | CPU reset |
//! | 16  | `RMVF`      | 1: hold all flags cleared |

/// Access to the hardware reset-cause register.
pub trait ResetCauseRegister {
    /// Raw register value.
    fn read_raw(&self) -> u32;

    /// Write the raw register value.
    fn write_raw(&mut self, value: u32);

    /// Clear every reset flag so the next boot starts clean, then release
    /// `RMVF` so the next reset can latch its flag.
    fn clear(&mut self) {
        self.write_raw(RSR_RMVF);
        self.write_raw(0);
    }
}

/// Decoded view over a raw `RCC_RSR` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetFlags(pub u32);

/// `RMVF`: remove-flags bit. Flags stay cleared while it reads 1.
pub const RSR_RMVF: u32 = 1 << 16;

/// Named reset flags in the order they are reported.
pub const RESET_FLAG_NAMES: &[(&str, u32)] = &[
    ("LPWR", 1 << 30),
    ("WWDG", 1 << 28),
    ("IWDG", 1 << 26),
    ("SFT", 1 << 24),
    ("POR", 1 << 23),
    ("PIN", 1 << 22),
    ("BOR", 1 << 21),
    ("D2", 1 << 20),
    ("D1", 1 << 19),
    ("CPU", 1 << 17),
];

/// Every flag bit `RMVF` clears.
pub const RSR_FLAGS_MASK: u32 = (1 << 30)
    | (1 << 28)
    | (1 << 26)
    | (1 << 24)
    | (1 << 23)
    | (1 << 22)
    | (1 << 21)
    | (1 << 20)
    | (1 << 19)
    | (1 << 17);

impl ResetFlags {
    /// Names of the flags set in this value, in [`RESET_FLAG_NAMES`] order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        RESET_FLAG_NAMES
            .iter()
            .filter(move |(_, mask)| self.0 & mask != 0)
            .map(|(name, _)| *name)
    }

    /// Independent or window watchdog reset.
    #[must_use]
    pub fn is_watchdog(self) -> bool {
        self.0 & ((1 << 28) | (1 << 26)) != 0
    }

    /// Software reset, which is what the panic path issues.
    #[must_use]
    pub fn is_software(self) -> bool {
        self.0 & (1 << 24) != 0
    }

    /// Power-on reset.
    #[must_use]
    pub fn is_power_on(self) -> bool {
        self.0 & (1 << 23) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_table_order() {
        let flags = ResetFlags((1 << 22) | (1 << 26) | (1 << 17));
        let mut names = flags.names();
        assert_eq!(names.next(), Some("IWDG"));
        assert_eq!(names.next(), Some("PIN"));
        assert_eq!(names.next(), Some("CPU"));
        assert_eq!(names.next(), None);
    }

    #[test]
    fn mask_covers_every_named_flag_and_not_rmvf() {
        let all = RESET_FLAG_NAMES.iter().fold(0, |acc, (_, m)| acc | m);
        assert_eq!(all, RSR_FLAGS_MASK);
        assert_eq!(RSR_FLAGS_MASK & RSR_RMVF, 0);
    }

    #[test]
    fn classification_helpers() {
        assert!(ResetFlags(1 << 26).is_watchdog());
        assert!(ResetFlags(1 << 28).is_watchdog());
        assert!(ResetFlags(1 << 24).is_software());
        assert!(ResetFlags(1 << 23).is_power_on());
        assert!(!ResetFlags(0).is_watchdog());
    }
}
