//! Linker script setup for the STM32H743 image.
//!
//! `memory.x` lives at the workspace root so xtask and the arch tests can read
//! it too. It stops FLASH one sector short: the last sector is the panic region.

fn main() -> std::io::Result<()> {
    #[cfg(feature = "hardware")]
    {
        use std::path::PathBuf;

        let out = PathBuf::from(std::env::var_os("OUT_DIR").unwrap_or_default());
        std::fs::write(out.join("memory.x"), include_bytes!("../../memory.x"))?;
        println!("cargo:rustc-link-search={}", out.display());
        println!("cargo:rerun-if-changed=../../memory.x");
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
