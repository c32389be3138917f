//! Process-level logging and fatal exits.

use std::fmt::Display;

use tracing::error;
use tracing_subscriber::EnvFilter;

/// Install a timestamped plain-text line logger on stdout.
///
/// No ANSI styling, so redirected output stays greppable. `RUST_LOG` takes
/// precedence over `verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("jda_core={level},jda={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(false)
        .with_target(false)
        .init();
}

/// Log `err` and terminate with a non-zero status.
pub fn die(err: impl Display) -> ! {
    error!("{err}");
    std::process::exit(1);
}
