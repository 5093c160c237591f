use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, oauth, ARG_PORT};
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let auth = auth::Options::parse(matches)?;
    let oauth = oauth::Options::parse(matches).context("invalid OAuth provider settings")?;

    Ok(Action::Server(Args { port, auth, oauth }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("AUTHGATE_PORT", Some("9090")),
                ("AUTHGATE_SECRET_KEY", Some("s3cret")),
                ("AUTHGATE_OAUTH_CLIENT_ID", None),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["authgate"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("server action expected");
                };
                assert_eq!(args.port, 9090);
                assert!(args.oauth.is_none());
            },
        );
    }

    #[test]
    fn missing_secret_key() {
        temp_env::with_var("AUTHGATE_SECRET_KEY", None::<&str>, || {
            let matches = commands::new().get_matches_from(vec!["authgate"]);
            assert!(handler(&matches).is_err());
        });
    }
}
