use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing::Level;

use rpmsift::driver;

#[derive(Parser)]
#[command(
    name = "rpmsift",
    about = "Find build requirements an RPM source package does not actually need"
)]
struct Cli {
    /// Path to the source package to analyze
    srpm: PathBuf,

    /// Mock chroot profile to build in
    #[arg(long, default_value = "default")]
    root: String,

    /// Keep the work directory (reference and probe results) on exit
    #[arg(long)]
    no_clean: bool,

    /// Only check that the package builds reproducibly, then exit
    #[arg(long)]
    reproduce_only: bool,

    /// Trust that removable sets compose without a confirming rebuild
    /// (faster, unsound in principle)
    #[arg(long)]
    assume_compose: bool,

    /// Log verbosity on stderr
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    loglvl: LogLevel,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            // tracing has no level above ERROR.
            LogLevel::Error | LogLevel::Critical => Level::ERROR,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.loglvl.level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match analyze(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn analyze(cli: &Cli) -> Result<u8> {
    let opts = driver::Options {
        srpm: cli.srpm.clone(),
        profile: cli.root.clone(),
        no_clean: cli.no_clean,
        reproduce_only: cli.reproduce_only,
        assume_compose: cli.assume_compose,
    };
    Ok(driver::run(&opts)? as u8)
}
