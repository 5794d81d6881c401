use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// One `cargo` invocation and how to report it.
struct Check {
    label: &'static str,
    args: &'static [&'static str],
    /// Report failures without aborting the run.
    advisory: bool,
}

const CHECKS: &[Check] = &[
    Check {
        label: "hardware target (STM32H7)",
        args: &[
            "check",
            "-p",
            "firmware",
            "--target",
            "thumbv7em-none-eabihf",
            "--features",
            "hardware",
        ],
        advisory: false,
    },
    Check {
        label: "platform crate (no_std)",
        args: &[
            "check",
            "-p",
            "platform",
            "--target",
            "thumbv7em-none-eabihf",
            "--no-default-features",
        ],
        advisory: false,
    },
    Check {
        label: "host tests (flash + console)",
        args: &["test", "-p", "platform", "-p", "firmware", "--features", "firmware/std"],
        advisory: false,
    },
    Check {
        label: "host tests (flash only)",
        args: &[
            "test",
            "-p",
            "firmware",
            "--no-default-features",
            "--features",
            "std,panic-to-flash",
        ],
        advisory: false,
    },
    Check {
        label: "host tests (console only)",
        args: &[
            "test",
            "-p",
            "firmware",
            "--no-default-features",
            "--features",
            "std,panic-to-console",
        ],
        advisory: false,
    },
    Check {
        label: "clippy lints",
        args: &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        advisory: true,
    },
    Check {
        label: "code formatting",
        args: &["fmt", "--all", "--check"],
        advisory: true,
    },
];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking firmware builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    for check in CHECKS {
        println!("{}", format!("  Checking {}...", check.label).cyan());
        let start = Instant::now();

        let output = Command::new("cargo")
            .args(check.args)
            .output()
            .with_context(|| format!("Failed to run cargo for {}", check.label))?;

        if output.status.success() {
            println!(
                "{}",
                format!(
                    "  ✓ {} passed in {:.2}s",
                    check.label,
                    start.elapsed().as_secs_f64()
                )
                .green()
            );
        } else if check.advisory {
            eprintln!("{}", format!("  ⚠ {} reported issues", check.label).yellow().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        } else {
            eprintln!("{}", format!("  ✗ {} failed", check.label).red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            anyhow::bail!("{} failed", check.label);
        }
        println!();
    }

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
