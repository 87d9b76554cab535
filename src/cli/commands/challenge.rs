use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_CHALLENGE_SERVICE_URL: &str = "challenge-service-url";
pub const ARG_CHALLENGE_SERVICE_TIMEOUT_SECONDS: &str = "challenge-service-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse challenge service arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the URL is missing, blank or not http(s), or the timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = match matches.get_one::<String>(ARG_CHALLENGE_SERVICE_URL).cloned() {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_CHALLENGE_SERVICE_URL}"),
        };
        let parsed = Url::parse(&url)
            .map_err(|err| anyhow::anyhow!("invalid --{ARG_CHALLENGE_SERVICE_URL}: {err}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("--{ARG_CHALLENGE_SERVICE_URL} must use http or https");
        }

        let timeout_seconds = matches
            .get_one::<u64>(ARG_CHALLENGE_SERVICE_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10);
        if timeout_seconds == 0 {
            anyhow::bail!("--{ARG_CHALLENGE_SERVICE_TIMEOUT_SECONDS} must be greater than zero");
        }

        Ok(Self {
            url,
            timeout_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CHALLENGE_SERVICE_URL)
                .long(ARG_CHALLENGE_SERVICE_URL)
                .help("Base URL of the WebAuthn challenge/verify service")
                .long_help(
                    "Base URL of the WebAuthn challenge/verify service.\n\nChallenges are requested from `{url}/v1/challenges` and assertions are verified at\n`{url}/v1/challenges/verify`.",
                )
                .env("SECUREAPPROVE_CHALLENGE_SERVICE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_SERVICE_TIMEOUT_SECONDS)
                .long(ARG_CHALLENGE_SERVICE_TIMEOUT_SECONDS)
                .help("Request timeout for the challenge service in seconds")
                .env("SECUREAPPROVE_CHALLENGE_SERVICE_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}
