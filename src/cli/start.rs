use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;

fn get_verbosity_level(matches: &clap::ArgMatches) -> Option<tracing::Level> {
    match matches.get_one::<u8>(commands::logging::ARG_VERBOSITY).copied() {
        Some(1) => Some(tracing::Level::WARN),
        Some(2) => Some(tracing::Level::INFO),
        Some(3) => Some(tracing::Level::DEBUG),
        Some(n) if n >= 4 => Some(tracing::Level::TRACE),
        _ => None,
    }
}

/// Parse arguments, install telemetry and resolve the action to run.
/// # Errors
/// Returns an error if telemetry cannot be initialized or arguments are invalid.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(get_verbosity_level(&matches))?;

    handler(&matches)
}
