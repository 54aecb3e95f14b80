// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup. Every option
//! has a documented default except the realm location, which is required.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` / `PORT` | Server bind address | `0.0.0.0` / `4001` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS when both are set | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `KC_URL` | Realm base URL | Required |
//! | `KC_REALM` | Realm name | Required |
//! | `KC_ISSUER` | Exact issuer override | unset |
//! | `KC_AUDIENCE` | Expected audience | unset (no audience check) |
//! | `KC_ALGORITHMS` | Accepted signature algorithms | `RS256` |
//! | `KC_CLOCK_SKEW_SECS` | Clock skew tolerance | `60` |
//! | `JWKS_CACHE_TTL_SECS` | Signing key max age | `600` |
//! | `JWKS_CACHE_MAX_ENTRIES` | Signing key cache capacity | `5` |
//! | `JWKS_REQUESTS_PER_MINUTE` | Key-set refetch cap | `10` |
//! | `JWKS_TIMEOUT_SECS` | Key-set fetch timeout | `10` |
//! | `AZ_ALIAS` | Identity-provider alias used for token exchange | `azure` |
//! | `EXCHANGE_TIMEOUT_SECS` | Delegated exchange timeout | `10` |
//! | `AZ_AUTHORITY` | Client-credentials authority | `https://login.microsoftonline.com/<AZ_TENANT_ID>` |
//! | `AZ_TENANT_ID` / `AZ_CLIENT_ID` / `AZ_CLIENT_SECRET` | Application credentials | unset |
//! | `AZ_SCOPE` | Client-credentials scope | `https://graph.microsoft.com/.default` |
//! | `APP_TOKEN_MAX_ATTEMPTS` | Grant attempts | `3` |
//! | `APP_TOKEN_INITIAL_BACKOFF_MS` | First retry backoff (doubles) | `300` |
//! | `APP_TOKEN_TIMEOUT_SECS` | Per-attempt grant timeout | `8` |
//! | `APP_TOKEN_SAFETY_MARGIN_SECS` | Expiry safety margin | `60` |
//! | `APP_TOKEN_DEFAULT_LIFETIME_SECS` | Lifetime when unreported | `3600` |
//! | `GRAPH_BASE_URL` | Resource API base URL | `https://graph.microsoft.com/v1.0` |
//! | `RESOURCE_TIMEOUT_SECS` | Resource call timeout | `10` |
//! | `DIRECTORY_PHOTO_ROLES` | Realm roles allowed to read other users' photos | unset |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 4001;
const DEFAULT_IDP_ALIAS: &str = "azure";
const DEFAULT_AUTHORITY_BASE: &str = "https://login.microsoftonline.com";
const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required setting {0} is missing")]
    Missing(&'static str),

    #[error("setting {name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

/// Where the identity realm lives and what its tokens must look like.
#[derive(Debug, Clone)]
pub struct RealmConfig {
    pub base_url: Url,
    /// `KC_URL` as configured, minus any trailing slash. Issuer candidates
    /// are built from this so host case and explicit ports survive.
    pub issuer_base: String,
    pub realm: String,
    pub issuer_override: Option<String>,
    pub audience: Option<String>,
    pub idp_alias: String,
}

impl RealmConfig {
    /// `<base>/realms/<realm>/<extra...>` with each segment percent-encoded.
    pub fn realm_url(&self, extra: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("realms")
                .push(&self.realm)
                .extend(extra);
        }
        url
    }

    pub fn jwks_url(&self) -> Url {
        self.realm_url(&["protocol", "openid-connect", "certs"])
    }

    pub fn token_exchange_url(&self) -> Url {
        self.realm_url(&["broker", self.idp_alias.as_str(), "token"])
    }
}

#[derive(Debug, Clone)]
pub struct KeySetSettings {
    pub ttl: Duration,
    pub max_entries: usize,
    pub requests_per_minute: u32,
    pub timeout: Duration,
}

impl Default for KeySetSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_entries: 5,
            requests_per_minute: 10,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub algorithms: Vec<Algorithm>,
    pub clock_skew: Duration,
    pub key_set: KeySetSettings,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
            clock_skew: Duration::from_secs(60),
            key_set: KeySetSettings::default(),
        }
    }
}

/// Client id/secret pair for the application-level grant.
#[derive(Clone)]
pub struct ClientCredentials {
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GrantPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub attempt_timeout: Duration,
    pub safety_margin: Duration,
    pub default_lifetime: Duration,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(300),
            attempt_timeout: Duration::from_secs(8),
            safety_margin: Duration::from_secs(60),
            default_lifetime: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub exchange_timeout: Duration,
    pub credentials: Option<ClientCredentials>,
    pub grant: GrantPolicy,
    pub resource_base_url: Url,
    pub resource_timeout: Duration,
    pub directory_photo_roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub realm: RealmConfig,
    pub verifier: VerifierSettings,
    pub broker: BrokerSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let host = env.or_default("HOST", DEFAULT_HOST);
        let port: u16 = env.parsed("PORT", DEFAULT_PORT)?;
        let bind = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "HOST",
                value: host.clone(),
                reason: e.to_string(),
            })?;
        let tls = match (env.optional("TLS_CERT_PATH"), env.optional("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            _ => None,
        };
        let log_format = match env.optional("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let kc_url = env.required("KC_URL")?;
        let realm = RealmConfig {
            base_url: parse_http_url("KC_URL", &kc_url)?,
            issuer_base: kc_url.trim_end_matches('/').to_string(),
            realm: env.required("KC_REALM")?,
            issuer_override: env.optional("KC_ISSUER"),
            audience: env.optional("KC_AUDIENCE"),
            idp_alias: env.or_default("AZ_ALIAS", DEFAULT_IDP_ALIAS),
        };

        let verifier = VerifierSettings {
            algorithms: env.algorithms("KC_ALGORITHMS")?,
            clock_skew: env.secs("KC_CLOCK_SKEW_SECS", 60)?,
            key_set: KeySetSettings {
                ttl: env.secs("JWKS_CACHE_TTL_SECS", 600)?,
                max_entries: env.parsed("JWKS_CACHE_MAX_ENTRIES", 5usize)?,
                requests_per_minute: env.parsed("JWKS_REQUESTS_PER_MINUTE", 10u32)?,
                timeout: env.secs("JWKS_TIMEOUT_SECS", 10)?,
            },
        };

        let broker = BrokerSettings {
            exchange_timeout: env.secs("EXCHANGE_TIMEOUT_SECS", 10)?,
            credentials: env.client_credentials()?,
            grant: GrantPolicy {
                max_attempts: env.parsed("APP_TOKEN_MAX_ATTEMPTS", 3u32)?.max(1),
                initial_backoff: Duration::from_millis(
                    env.parsed("APP_TOKEN_INITIAL_BACKOFF_MS", 300u64)?,
                ),
                attempt_timeout: env.secs("APP_TOKEN_TIMEOUT_SECS", 8)?,
                safety_margin: env.secs("APP_TOKEN_SAFETY_MARGIN_SECS", 60)?,
                default_lifetime: env.secs("APP_TOKEN_DEFAULT_LIFETIME_SECS", 3600)?,
            },
            resource_base_url: env.http_url("GRAPH_BASE_URL", Some(DEFAULT_GRAPH_BASE_URL))?,
            resource_timeout: env.secs("RESOURCE_TIMEOUT_SECS", 10)?,
            directory_photo_roles: env.list("DIRECTORY_PHOTO_ROLES"),
        };

        Ok(Self {
            server: ServerConfig {
                bind,
                tls,
                log_format,
            },
            realm,
            verifier,
            broker,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed(name, default).map(Duration::from_secs)
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.optional(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn http_url(&self, name: &'static str, default: Option<&str>) -> Result<Url, ConfigError> {
        let value = match (self.optional(name), default) {
            (Some(v), _) => v,
            (None, Some(d)) => d.to_string(),
            (None, None) => return Err(ConfigError::Missing(name)),
        };
        parse_http_url(name, &value)
    }

    fn algorithms(&self, name: &'static str) -> Result<Vec<Algorithm>, ConfigError> {
        let raw = self.list(name);
        if raw.is_empty() {
            return Ok(vec![Algorithm::RS256]);
        }
        raw.into_iter()
            .map(|value| {
                let alg = Algorithm::from_str(&value).map_err(|e| ConfigError::Invalid {
                    name,
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
                if !is_asymmetric(alg) {
                    return Err(ConfigError::Invalid {
                        name,
                        value,
                        reason: "only asymmetric algorithms are accepted".to_string(),
                    });
                }
                Ok(alg)
            })
            .collect()
    }

    fn client_credentials(&self) -> Result<Option<ClientCredentials>, ConfigError> {
        let (Some(client_id), Some(client_secret)) =
            (self.optional("AZ_CLIENT_ID"), self.optional("AZ_CLIENT_SECRET"))
        else {
            return Ok(None);
        };

        let authority = match self.optional("AZ_AUTHORITY") {
            Some(authority) => authority,
            None => {
                let tenant = self.required("AZ_TENANT_ID")?;
                format!("{DEFAULT_AUTHORITY_BASE}/{tenant}")
            }
        };
        let mut token_url = parse_http_url("AZ_AUTHORITY", &authority)?;
        if let Ok(mut segments) = token_url.path_segments_mut() {
            segments.pop_if_empty().extend(["oauth2", "v2.0", "token"]);
        }

        Ok(Some(ClientCredentials {
            token_url,
            client_id,
            client_secret,
            scope: self.or_default("AZ_SCOPE", DEFAULT_SCOPE),
        }))
    }
}

fn parse_http_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected an http(s) URL".to_string(),
        });
    }
    Ok(url)
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}
