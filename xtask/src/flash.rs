use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

const TARGET: &str = "thumbv7em-none-eabihf";
const CHIP: &str = "STM32H743ZITx";

fn binary_path(release: bool) -> String {
    let mode = if release { "release" } else { "debug" };
    format!("target/{TARGET}/{mode}/firmware")
}

/// Print stderr and bail when `output` is a failure.
fn require_success(output: &Output, what: &str, hint: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    eprintln!("{}", format!("✗ {what} failed").red().bold());
    eprintln!();
    eprintln!("{}", String::from_utf8_lossy(&output.stderr));
    anyhow::bail!("{what} failed{hint}")
}

pub fn run(release: bool) -> Result<()> {
    let mode = if release { "release" } else { "debug" };

    println!();
    println!(
        "{}",
        format!("🔨 Building firmware ({mode} mode)...").cyan().bold()
    );
    println!();

    let build_start = Instant::now();
    let mut build_cmd = Command::new("cargo");
    build_cmd.args(["build", "-p", "firmware", "--target", TARGET, "--features", "hardware"]);
    if release {
        build_cmd.arg("--release");
    }
    let build_output = build_cmd.output().context("Failed to run cargo build")?;
    require_success(&build_output, "Build", "")?;
    println!(
        "{}",
        format!(
            "✓ Build successful in {:.2}s",
            build_start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();

    show_binary_size(release);
    println!();

    // memory.x stops FLASH one sector short, so probe-rs never erases the
    // panic region and a stored fault survives reflashing.
    println!("{}", "📡 Flashing to STM32H7...".cyan().bold());
    println!("   {}", "Connecting to probe...".dimmed());

    let flash_start = Instant::now();
    let flash_output = Command::new("probe-rs")
        .arg("run")
        .arg(binary_path(release))
        .args(["--chip", CHIP, "--probe-index", "0"])
        .output()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;
    require_success(
        &flash_output,
        "Flash",
        " - check that the probe is connected and the device is powered",
    )?;
    println!(
        "{}",
        format!(
            "✓ Flash successful in {:.2}s",
            flash_start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();
    println!("{}", "Fault capture firmware is running on hardware!".bold());
    println!(
        "   {}",
        format!("Use 'probe-rs attach --chip {CHIP}' to view RTT logs").dimmed()
    );
    println!(
        "   {}",
        "Operator console: USART3 (PD8/PD9), try 'fault status'".dimmed()
    );
    println!();

    Ok(())
}

/// Section sizes via `rust-size`, if installed. Missing tools are not an error.
fn show_binary_size(release: bool) {
    let Ok(out) = Command::new("rust-size").arg(binary_path(release)).arg("-A").output() else {
        return;
    };
    if !out.status.success() {
        return;
    }
    println!("{}", "📊 Binary size:".cyan());
    for line in String::from_utf8_lossy(&out.stdout).lines() {
        println!("   {}", line.dimmed());
    }
}
