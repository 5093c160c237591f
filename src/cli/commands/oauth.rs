use crate::social::OAuthInfo;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_OAUTH_NAME: &str = "oauth-name";
pub const ARG_OAUTH_CLIENT_ID: &str = "oauth-client-id";
pub const ARG_OAUTH_CLIENT_SECRET: &str = "oauth-client-secret";
pub const ARG_OAUTH_AUTH_URL: &str = "oauth-auth-url";
pub const ARG_OAUTH_API_URL: &str = "oauth-api-url";
pub const ARG_OAUTH_REDIRECT_URL: &str = "oauth-redirect-url";
pub const ARG_OAUTH_SCOPES: &str = "oauth-scopes";
pub const ARG_OAUTH_HOSTED_DOMAIN: &str = "oauth-hosted-domain";
pub const ARG_OAUTH_USE_PKCE: &str = "oauth-use-pkce";
pub const ARG_OAUTH_ALLOW_SIGN_UP: &str = "oauth-allow-sign-up";
pub const ARG_OAUTH_ALLOWED_DOMAINS: &str = "oauth-allowed-domains";
pub const ARG_OAUTH_ALLOWED_GROUPS: &str = "oauth-allowed-groups";
pub const ARG_OAUTH_SESSION_FALLBACK: &str = "oauth-session-fallback";

/// A configured OAuth provider. Absent when `--oauth-client-id` is not set.
#[derive(Debug, Clone)]
pub struct Options {
    pub info: OAuthInfo,
    /// Let the session client retry unknown cookies as bearer tokens.
    pub session_fallback: bool,
}

fn list(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_one::<String>(id)
        .map(|value| {
            value
                .split([',', ' '])
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

impl Options {
    /// Parse the provider arguments.
    ///
    /// # Errors
    /// Returns an error if a client id is given without its secret or URLs.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Option<Self>> {
        let Some(client_id) = matches
            .get_one::<String>(ARG_OAUTH_CLIENT_ID)
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(None);
        };

        let client_secret = matches
            .get_one::<String>(ARG_OAUTH_CLIENT_SECRET)
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_OAUTH_CLIENT_SECRET}")
            })?;

        for required in [ARG_OAUTH_AUTH_URL, ARG_OAUTH_API_URL] {
            if string(matches, required).is_empty() {
                anyhow::bail!("missing required argument: --{required}");
            }
        }

        let mut info = OAuthInfo::new(
            &string(matches, ARG_OAUTH_NAME),
            client_id,
            SecretString::from(client_secret.clone()),
        );
        info.auth_url = string(matches, ARG_OAUTH_AUTH_URL);
        info.api_url = string(matches, ARG_OAUTH_API_URL);
        info.redirect_url = string(matches, ARG_OAUTH_REDIRECT_URL);
        info.scopes = list(matches, ARG_OAUTH_SCOPES);
        info.hosted_domain = string(matches, ARG_OAUTH_HOSTED_DOMAIN);
        info.use_pkce = matches.get_flag(ARG_OAUTH_USE_PKCE);
        info.allow_sign_up = matches
            .get_one::<bool>(ARG_OAUTH_ALLOW_SIGN_UP)
            .copied()
            .unwrap_or(true);
        info.allowed_domains = list(matches, ARG_OAUTH_ALLOWED_DOMAINS);
        info.allowed_groups = list(matches, ARG_OAUTH_ALLOWED_GROUPS);

        Ok(Some(Self {
            info,
            session_fallback: matches.get_flag(ARG_OAUTH_SESSION_FALLBACK),
        }))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OAUTH_NAME)
                .long(ARG_OAUTH_NAME)
                .help("Provider name used in /login/{provider}")
                .env("AUTHGATE_OAUTH_NAME")
                .default_value("generic_oauth"),
        )
        .arg(
            Arg::new(ARG_OAUTH_CLIENT_ID)
                .long(ARG_OAUTH_CLIENT_ID)
                .help("OAuth client id, enables bearer authentication")
                .env("AUTHGATE_OAUTH_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_OAUTH_CLIENT_SECRET)
                .long(ARG_OAUTH_CLIENT_SECRET)
                .help("OAuth client secret")
                .env("AUTHGATE_OAUTH_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_OAUTH_AUTH_URL)
                .long(ARG_OAUTH_AUTH_URL)
                .help("Provider authorization endpoint")
                .env("AUTHGATE_OAUTH_AUTH_URL"),
        )
        .arg(
            Arg::new(ARG_OAUTH_API_URL)
                .long(ARG_OAUTH_API_URL)
                .help("Provider user info endpoint")
                .env("AUTHGATE_OAUTH_API_URL"),
        )
        .arg(
            Arg::new(ARG_OAUTH_REDIRECT_URL)
                .long(ARG_OAUTH_REDIRECT_URL)
                .help("Callback URL registered with the provider")
                .env("AUTHGATE_OAUTH_REDIRECT_URL"),
        )
        .arg(
            Arg::new(ARG_OAUTH_SCOPES)
                .long(ARG_OAUTH_SCOPES)
                .help("Requested scopes, comma or space separated")
                .env("AUTHGATE_OAUTH_SCOPES")
                .default_value("openid,email,profile"),
        )
        .arg(
            Arg::new(ARG_OAUTH_HOSTED_DOMAIN)
                .long(ARG_OAUTH_HOSTED_DOMAIN)
                .help("Hosted domain hint (hd parameter)")
                .env("AUTHGATE_OAUTH_HOSTED_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_OAUTH_USE_PKCE)
                .long(ARG_OAUTH_USE_PKCE)
                .help("Use PKCE (S256) on the authorization request")
                .env("AUTHGATE_OAUTH_USE_PKCE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_OAUTH_ALLOW_SIGN_UP)
                .long(ARG_OAUTH_ALLOW_SIGN_UP)
                .help("Allow unknown users to sign up through the provider")
                .env("AUTHGATE_OAUTH_ALLOW_SIGN_UP")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_OAUTH_ALLOWED_DOMAINS)
                .long(ARG_OAUTH_ALLOWED_DOMAINS)
                .help("Accepted email domains, empty accepts all")
                .env("AUTHGATE_OAUTH_ALLOWED_DOMAINS"),
        )
        .arg(
            Arg::new(ARG_OAUTH_ALLOWED_GROUPS)
                .long(ARG_OAUTH_ALLOWED_GROUPS)
                .help("Required group memberships, empty accepts all")
                .env("AUTHGATE_OAUTH_ALLOWED_GROUPS"),
        )
        .arg(
            Arg::new(ARG_OAUTH_SESSION_FALLBACK)
                .long(ARG_OAUTH_SESSION_FALLBACK)
                .help("Treat unknown session cookies as provider access tokens")
                .env("AUTHGATE_OAUTH_SESSION_FALLBACK")
                .action(ArgAction::SetTrue),
        )
}
