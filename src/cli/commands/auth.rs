use crate::authn::clients::FallbackPolicy;
use crate::config::{AuthConfig, FeatureToggles, SameSite};
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_SECRET_KEY: &str = "secret-key";
pub const ARG_LOGIN_COOKIE_NAME: &str = "login-cookie-name";
pub const ARG_LOGIN_MAX_LIFETIME_DAYS: &str = "login-max-lifetime-days";
pub const ARG_COOKIE_PATH: &str = "cookie-path";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_SAMESITE: &str = "cookie-samesite";
pub const ARG_TOKEN_ROTATION_INTERVAL_MINUTES: &str = "token-rotation-interval-minutes";
pub const ARG_OAUTH_SKIP_ORG_ROLE_UPDATE_SYNC: &str = "oauth-skip-org-role-update-sync";
pub const ARG_OAUTH_ALLOW_INSECURE_EMAIL_LOOKUP: &str = "oauth-allow-insecure-email-lookup";
pub const ARG_AUTO_ASSIGN_ORG_ID: &str = "auto-assign-org-id";
pub const ARG_FEATURE_TOGGLES: &str = "feature-toggles";
pub const ARG_FALLBACK_GRANT_ADMIN: &str = "session-fallback-grant-admin";
pub const ARG_FALLBACK_ALLOW_SIGN_UP: &str = "session-fallback-allow-sign-up";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Options {
    pub secret_key: SecretString,
    pub login_cookie_name: String,
    pub login_max_lifetime_days: u64,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub token_rotation_interval_minutes: u64,
    pub oauth_skip_org_role_update_sync: bool,
    pub oauth_allow_insecure_email_lookup: bool,
    pub auto_assign_org_id: i64,
    pub feature_toggles: FeatureToggles,
    pub fallback_policy: FallbackPolicy,
}

impl Options {
    /// Parse authentication arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret key is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret_key = match matches.get_one::<String>(ARG_SECRET_KEY) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_SECRET_KEY}"),
        };

        let flag = |id: &str| matches.get_flag(id);

        Ok(Self {
            secret_key,
            login_cookie_name: matches
                .get_one::<String>(ARG_LOGIN_COOKIE_NAME)
                .cloned()
                .unwrap_or_default(),
            login_max_lifetime_days: matches
                .get_one::<u64>(ARG_LOGIN_MAX_LIFETIME_DAYS)
                .copied()
                .unwrap_or(30),
            cookie_path: matches
                .get_one::<String>(ARG_COOKIE_PATH)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            cookie_secure: flag(ARG_COOKIE_SECURE),
            cookie_same_site: matches
                .get_one::<SameSite>(ARG_COOKIE_SAMESITE)
                .copied()
                .unwrap_or_default(),
            token_rotation_interval_minutes: matches
                .get_one::<u64>(ARG_TOKEN_ROTATION_INTERVAL_MINUTES)
                .copied()
                .unwrap_or(10),
            oauth_skip_org_role_update_sync: flag(ARG_OAUTH_SKIP_ORG_ROLE_UPDATE_SYNC),
            oauth_allow_insecure_email_lookup: flag(ARG_OAUTH_ALLOW_INSECURE_EMAIL_LOOKUP),
            auto_assign_org_id: matches
                .get_one::<i64>(ARG_AUTO_ASSIGN_ORG_ID)
                .copied()
                .unwrap_or(1),
            feature_toggles: FeatureToggles::from_list(
                matches
                    .get_one::<String>(ARG_FEATURE_TOGGLES)
                    .map_or("", String::as_str),
            ),
            fallback_policy: FallbackPolicy {
                grant_admin: matches
                    .get_one::<bool>(ARG_FALLBACK_GRANT_ADMIN)
                    .copied()
                    .unwrap_or(true),
                allow_sign_up: matches
                    .get_one::<bool>(ARG_FALLBACK_ALLOW_SIGN_UP)
                    .copied()
                    .unwrap_or(true),
            },
        })
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.secret_key.clone())
            .with_login_cookie_name(self.login_cookie_name.clone())
            .with_login_max_lifetime(Duration::from_secs(
                self.login_max_lifetime_days.saturating_mul(SECONDS_PER_DAY),
            ))
            .with_cookie_path(self.cookie_path.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_cookie_same_site(self.cookie_same_site)
            .with_token_rotation_interval_minutes(self.token_rotation_interval_minutes)
            .with_oauth_skip_org_role_update_sync(self.oauth_skip_org_role_update_sync)
            .with_oauth_allow_insecure_email_lookup(self.oauth_allow_insecure_email_lookup)
            .with_auto_assign_org_id(self.auto_assign_org_id)
    }
}

fn validator_same_site() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<SameSite, String> {
        SameSite::parse(value).ok_or_else(|| "expected lax, strict, none or disabled".to_string())
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_cookie_args(command);
    let command = with_session_args(command);
    with_oauth_policy_args(command)
}

fn with_cookie_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SECRET_KEY)
                .long(ARG_SECRET_KEY)
                .help("Server secret used to sign OAuth state")
                .env("AUTHGATE_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_COOKIE_NAME)
                .long(ARG_LOGIN_COOKIE_NAME)
                .help("Session cookie name, empty disables cookie authentication")
                .env("AUTHGATE_LOGIN_COOKIE_NAME")
                .default_value("authgate_session"),
        )
        .arg(
            Arg::new(ARG_COOKIE_PATH)
                .long(ARG_COOKIE_PATH)
                .help("Path attribute of the session cookie")
                .env("AUTHGATE_COOKIE_PATH")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark cookies Secure (serve over HTTPS)")
                .env("AUTHGATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAMESITE)
                .long(ARG_COOKIE_SAMESITE)
                .help("SameSite attribute: lax, strict, none or disabled")
                .env("AUTHGATE_COOKIE_SAMESITE")
                .default_value("lax")
                .value_parser(validator_same_site()),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_MAX_LIFETIME_DAYS)
                .long(ARG_LOGIN_MAX_LIFETIME_DAYS)
                .help("Maximum session lifetime in days")
                .env("AUTHGATE_LOGIN_MAX_LIFETIME_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TOKEN_ROTATION_INTERVAL_MINUTES)
                .long(ARG_TOKEN_ROTATION_INTERVAL_MINUTES)
                .help("Session token rotation interval in minutes")
                .env("AUTHGATE_TOKEN_ROTATION_INTERVAL_MINUTES")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FEATURE_TOGGLES)
                .long(ARG_FEATURE_TOGGLES)
                .help("Comma separated feature flags, e.g. clientTokenRotation")
                .env("AUTHGATE_FEATURE_TOGGLES")
                .default_value(""),
        )
}

fn with_oauth_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OAUTH_SKIP_ORG_ROLE_UPDATE_SYNC)
                .long(ARG_OAUTH_SKIP_ORG_ROLE_UPDATE_SYNC)
                .help("Ignore provider roles")
                .env("AUTHGATE_OAUTH_SKIP_ORG_ROLE_UPDATE_SYNC")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_OAUTH_ALLOW_INSECURE_EMAIL_LOOKUP)
                .long(ARG_OAUTH_ALLOW_INSECURE_EMAIL_LOOKUP)
                .help("Allow matching existing users by email")
                .env("AUTHGATE_OAUTH_ALLOW_INSECURE_EMAIL_LOOKUP")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_AUTO_ASSIGN_ORG_ID)
                .long(ARG_AUTO_ASSIGN_ORG_ID)
                .help("Organization receiving the provider role")
                .env("AUTHGATE_AUTO_ASSIGN_ORG_ID")
                .default_value("1")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FALLBACK_GRANT_ADMIN)
                .long(ARG_FALLBACK_GRANT_ADMIN)
                .help("Grant server admin to users authenticated by the cookie OAuth fallback")
                .env("AUTHGATE_SESSION_FALLBACK_GRANT_ADMIN")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_FALLBACK_ALLOW_SIGN_UP)
                .long(ARG_FALLBACK_ALLOW_SIGN_UP)
                .help("Allow sign up for users authenticated by the cookie OAuth fallback")
                .env("AUTHGATE_SESSION_FALLBACK_ALLOW_SIGN_UP")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FLAG_CLIENT_TOKEN_ROTATION;
    use secrecy::ExposeSecret;

    fn matches(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["authgate"];
        argv.extend_from_slice(args);
        with_args(Command::new("authgate")).get_matches_from(argv)
    }

    #[test]
    fn secret_key_required() {
        temp_env::with_var("AUTHGATE_SECRET_KEY", None::<&str>, || {
            let result = Options::parse(&matches(&[]));
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --secret-key"));
            }
        });
    }

    #[test]
    fn defaults() {
        temp_env::with_vars(
            [
                ("AUTHGATE_SECRET_KEY", Some("s3cret")),
                ("AUTHGATE_FEATURE_TOGGLES", None),
                ("AUTHGATE_COOKIE_SAMESITE", None),
            ],
            || {
                let Ok(opts) = Options::parse(&matches(&[])) else {
                    panic!("options should parse");
                };
                assert_eq!(opts.secret_key.expose_secret(), "s3cret");
                assert_eq!(opts.login_cookie_name, "authgate_session");
                assert_eq!(opts.cookie_same_site, SameSite::Lax);
                assert_eq!(opts.fallback_policy, FallbackPolicy::default());

                let cfg = opts.auth_config();
                assert_eq!(cfg.token_rotation_interval(), Duration::from_secs(600));
                assert_eq!(
                    cfg.login_max_lifetime(),
                    Duration::from_secs(30 * SECONDS_PER_DAY)
                );
                assert_eq!(cfg.auto_assign_org_id(), 1);
                assert!(!opts.feature_toggles.is_enabled(FLAG_CLIENT_TOKEN_ROTATION));
            },
        );
    }

    #[test]
    fn env_overrides() {
        temp_env::with_vars(
            [
                ("AUTHGATE_SECRET_KEY", Some("s3cret")),
                ("AUTHGATE_FEATURE_TOGGLES", Some("clientTokenRotation")),
                ("AUTHGATE_COOKIE_SAMESITE", Some("strict")),
                ("AUTHGATE_SESSION_FALLBACK_GRANT_ADMIN", Some("false")),
                ("AUTHGATE_TOKEN_ROTATION_INTERVAL_MINUTES", Some("3")),
            ],
            || {
                let Ok(opts) = Options::parse(&matches(&[])) else {
                    panic!("options should parse");
                };
                assert!(opts.feature_toggles.is_enabled(FLAG_CLIENT_TOKEN_ROTATION));
                assert_eq!(opts.cookie_same_site, SameSite::Strict);
                assert!(!opts.fallback_policy.grant_admin);
                assert!(opts.fallback_policy.allow_sign_up);
                assert_eq!(opts.token_rotation_interval_minutes, 3);
            },
        );
    }

    #[test]
    fn invalid_same_site_rejected() {
        temp_env::with_var("AUTHGATE_SECRET_KEY", Some("s3cret"), || {
            let result = with_args(Command::new("authgate")).try_get_matches_from(vec![
                "authgate",
                "--cookie-samesite",
                "sometimes",
            ]);
            assert!(result.is_err());
        });
    }
}
