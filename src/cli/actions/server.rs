use crate::api::{self, ServerConfig};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub challenge_service_url: String,
    pub challenge_service_timeout_seconds: u64,
    pub frontend_base_url: String,
}

impl Args {
    fn server_config(self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            dsn: self.dsn,
            challenge_service_url: self.challenge_service_url,
            challenge_service_timeout: Duration::from_secs(self.challenge_service_timeout_seconds),
            frontend_base_url: self.frontend_base_url,
        }
    }
}

/// Strip credentials so the DSN can be logged.
fn redacted_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    Url::parse(&args.dsn).context("Invalid database DSN")?;

    debug!(
        port = args.port,
        dsn = %redacted_dsn(&args.dsn),
        challenge_service_url = %args.challenge_service_url,
        "Starting approval server"
    );

    api::new(args.server_config()).await
}
