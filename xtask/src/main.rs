//! Build automation tasks for FIOS
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "FIOS build automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all tests
    Test,

    /// Run clippy lints
    Lint,

    /// Check formatting
    Fmt,

    /// Run all CI checks
    Ci,

    /// Run the transfer benchmarks
    Bench,

    /// Build the C library and generate its header
    Ffi,

    /// Run a fuzz target for a fixed time (requires cargo-fuzz)
    Fuzz {
        /// Target name, e.g. fuzz_command_decode
        #[arg(default_value = "fuzz_command_decode")]
        target: String,

        /// Seconds to run
        #[arg(short, long, default_value_t = 60)]
        seconds: u64,
    },

    /// Generate documentation
    Doc,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => {
            run_command("cargo", &["test", "--all-features", "--workspace"])?;
        }
        Commands::Lint => {
            run_command("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
        }
        Commands::Fmt => {
            run_command("cargo", &["fmt", "--all", "--check"])?;
        }
        Commands::Ci => {
            println!("Running CI checks...");
            run_command("cargo", &["fmt", "--all", "--check"])?;
            run_command("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
            run_command("cargo", &["test", "--all-features", "--workspace"])?;
            println!("All CI checks passed!");
        }
        Commands::Bench => {
            run_command("cargo", &["bench", "-p", "fios-integration-tests", "-p", "fios-core"])?;
        }
        Commands::Ffi => {
            run_command("cargo", &["build", "--release", "-p", "fios-ffi"])?;
            println!("Header written to target/include/fios_ffi.h");
        }
        Commands::Fuzz { target, seconds } => {
            let max_time = format!("-max_total_time={seconds}");
            run_command("cargo", &["fuzz", "run", &target, "--", &max_time])?;
        }
        Commands::Doc => {
            run_command("cargo", &["doc", "--workspace", "--no-deps", "--open"])?;
        }
    }

    Ok(())
}

fn run_command(program: &str, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new(program).args(args).status()?;

    if !status.success() {
        anyhow::bail!("{} {:?} failed", program, args);
    }

    Ok(())
}
