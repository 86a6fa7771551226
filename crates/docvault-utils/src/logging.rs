//! Logging setup for the docvault CLI.
//!
//! Structured logging via tracing with an env-filter override
//! (`RUST_LOG`), a compact default format, and a verbose variant that
//! keeps targets visible for debugging pipelines.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Whether colored output should be used: stdout is a TTY and NO_COLOR
/// is unset.
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise verbose mode enables debug for
/// docvault crates and info elsewhere, and the default stays at
/// info/warn.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("docvault=debug,info")
            } else {
                EnvFilter::try_new("docvault=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(use_color())
                .with_target(verbose)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
