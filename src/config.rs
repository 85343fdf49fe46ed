use serde::Deserialize;
use std::{env, fmt, fs, path::Path, path::PathBuf};

/// Default access token lifetime (1 hour).
pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 3600;

/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 3600;

/// Secrets shorter than this still work but are logged as weak.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Configuration for issuing and verifying session tokens.
///
/// The access and refresh secrets are independent so either can be rotated
/// without invalidating tokens signed with the other.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,
    /// HMAC secret for refresh tokens
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: i64,
    /// Server build the clients must match, if enforced
    #[serde(default)]
    pub expected_version: Option<String>,
    /// Clock skew tolerance applied to `exp`
    #[serde(default)]
    pub leeway_seconds: u64,
}

fn default_access_ttl() -> i64 {
    DEFAULT_ACCESS_TTL_SECONDS
}

fn default_refresh_ttl() -> i64 {
    DEFAULT_REFRESH_TTL_SECONDS
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("expected_version", &self.expected_version)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl SessionConfig {
    /// Create a config with the given secrets and default lifetimes.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            expected_version: None,
            leeway_seconds: 0,
        }
    }

    pub fn with_expected_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    pub fn with_access_ttl(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    pub fn with_refresh_ttl(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Build a config from `FLEET_*` environment variables.
    ///
    /// `FLEET_ACCESS_SECRET` and `FLEET_REFRESH_SECRET` are required;
    /// `FLEET_ACCESS_TTL`, `FLEET_REFRESH_TTL`, `FLEET_LEEWAY` and
    /// `FLEET_APP_VERSION` are optional.
    pub fn from_env() -> anyhow::Result<Self> {
        let access_secret = env::var("FLEET_ACCESS_SECRET")
            .map_err(|_| anyhow::anyhow!("FLEET_ACCESS_SECRET is not set"))?;
        let refresh_secret = env::var("FLEET_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("FLEET_REFRESH_SECRET is not set"))?;

        let mut config = Self::new(access_secret, refresh_secret);

        if let Ok(ttl) = env::var("FLEET_ACCESS_TTL") {
            config.access_ttl_seconds = ttl
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid FLEET_ACCESS_TTL `{}`: {}", ttl, e))?;
        }
        if let Ok(ttl) = env::var("FLEET_REFRESH_TTL") {
            config.refresh_ttl_seconds = ttl
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid FLEET_REFRESH_TTL `{}`: {}", ttl, e))?;
        }
        if let Ok(leeway) = env::var("FLEET_LEEWAY") {
            config.leeway_seconds = leeway
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid FLEET_LEEWAY `{}`: {}", leeway, e))?;
        }
        config.expected_version = env::var("FLEET_APP_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(config)
    }

    /// Check the config is usable for signing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_secret.is_empty() {
            anyhow::bail!("access secret is not configured");
        }
        if self.refresh_secret.is_empty() {
            anyhow::bail!("refresh secret is not configured");
        }
        if self.access_secret == self.refresh_secret {
            anyhow::bail!("access and refresh secrets must differ");
        }
        if self.access_ttl_seconds <= 0 {
            anyhow::bail!("access token lifetime must be positive");
        }
        if self.refresh_ttl_seconds < self.access_ttl_seconds {
            anyhow::bail!("refresh token lifetime must not be shorter than access token lifetime");
        }
        if self.access_secret.len() < RECOMMENDED_SECRET_LEN
            || self.refresh_secret.len() < RECOMMENDED_SECRET_LEN
        {
            tracing::warn!(
                "Session secrets are shorter than recommended ({} bytes)",
                RECOMMENDED_SECRET_LEN
            );
        }
        Ok(())
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("FLEET_SESSION_CONFIG") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("fleet-session.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

/// Load a JSON session config, expanding `${VAR}` references in string fields.
pub fn load_session_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
    let mut cfg: SessionConfig = serde_json::from_str(&raw)?;

    cfg.access_secret = expand_env_vars(&cfg.access_secret);
    cfg.refresh_secret = expand_env_vars(&cfg.refresh_secret);
    if let Some(version) = cfg.expected_version.as_mut() {
        *version = expand_env_vars(version);
    }
    cfg.expected_version = cfg.expected_version.filter(|v| !v.trim().is_empty());

    Ok(cfg)
}
