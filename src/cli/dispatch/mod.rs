use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, challenge},
};
use anyhow::Result;

/// Map parsed arguments to the action to run.
/// # Errors
/// Returns an error if a required argument is missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let challenge = challenge::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port: matches
            .get_one::<u16>(commands::ARG_PORT)
            .copied()
            .unwrap_or(8080),
        dsn: matches
            .get_one::<String>(commands::ARG_DSN)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        challenge_service_url: challenge.url,
        challenge_service_timeout_seconds: challenge.timeout_seconds,
        frontend_base_url: matches
            .get_one::<String>(commands::ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "https://secureapprove.dev".to_string()),
    }))
}
