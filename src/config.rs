use anyhow::{Context, bail};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};
use url::Url;

use crate::types::{InstitutionId, Role, Username};
use crate::users::admins::AdminPermission;

/// Upper bound for token lifetimes and retention windows: ten years.
pub const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Top-level configuration, loaded once at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub institutions: BTreeMap<InstitutionId, InstitutionConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstitutionConfig {
    pub base_url: String,
    #[serde(default)]
    pub bootstrap_admins: Vec<BootstrapAdmin>,
}

/// An administrator created at startup when not already present.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: Username,
    #[serde(default)]
    pub permissions: Vec<AdminPermission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Push expiry forward on every successful validation.
    #[serde(default)]
    pub sliding_expiry: bool,
    /// Revoke a user's other sessions when a new token is issued.
    #[serde(default)]
    pub single_session: bool,
    /// Background reaper period; 0 disables the reaper.
    #[serde(default = "default_reap_interval_seconds")]
    pub reap_interval_seconds: u64,
    /// How long expired and revoked records are kept after their expiry.
    #[serde(default = "default_token_ttl_seconds")]
    pub expired_retention_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationConfig {
    /// Explicit role widening, e.g. `{"admin": ["instructor"]}`.
    #[serde(default)]
    pub grants: BTreeMap<Role, Vec<Role>>,
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

fn default_token_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_reap_interval_seconds() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl_seconds(),
            sliding_expiry: false,
            single_session: false,
            reap_interval_seconds: default_reap_interval_seconds(),
            expired_retention_seconds: default_token_ttl_seconds(),
        }
    }
}

impl SessionConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        capped_seconds(self.token_ttl_seconds)
    }

    pub fn expired_retention(&self) -> chrono::Duration {
        capped_seconds(self.expired_retention_seconds)
    }

    pub fn reap_interval(&self) -> Option<std::time::Duration> {
        (self.reap_interval_seconds > 0)
            .then(|| std::time::Duration::from_secs(self.reap_interval_seconds))
    }
}

/// Seconds as a duration, clamped to [`MAX_DURATION_SECONDS`].
fn capped_seconds(seconds: u64) -> chrono::Duration {
    let seconds = i64::try_from(seconds.min(MAX_DURATION_SECONDS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(seconds).unwrap_or(chrono::Duration::MAX)
}

impl GateConfig {
    /// Parse and validate a configuration document, expanding `${VAR}`
    /// placeholders in every string value.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(raw).context("Parsing configuration JSON")?;
        expand_value(&mut value);
        let config: GateConfig =
            serde_json::from_value(value).context("Reading configuration fields")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading configuration from {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Loading {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.institutions.is_empty() {
            bail!("At least one institution must be configured");
        }
        for (id, institution) in &self.institutions {
            if !id.is_well_formed() {
                bail!(
                    "Institution key `{}` must be non-empty and use only a-z, 0-9, `_` or `-`",
                    id
                );
            }
            Url::parse(&institution.base_url)
                .with_context(|| format!("Institution `{}` has an invalid base_url", id))?;
        }
        if self.session.token_ttl_seconds == 0 {
            bail!("session.token_ttl_seconds must be greater than zero");
        }
        if self.session.token_ttl_seconds > MAX_DURATION_SECONDS {
            bail!(
                "session.token_ttl_seconds must be at most {} (ten years)",
                MAX_DURATION_SECONDS
            );
        }
        if self.session.expired_retention_seconds > MAX_DURATION_SECONDS {
            bail!(
                "session.expired_retention_seconds must be at most {} (ten years)",
                MAX_DURATION_SECONDS
            );
        }
        Ok(())
    }

    /// Build the immutable institution directory.
    pub fn institutions(&self) -> anyhow::Result<Institutions> {
        let mut map = BTreeMap::new();
        for (id, cfg) in &self.institutions {
            let base_url = Url::parse(&cfg.base_url)
                .with_context(|| format!("Institution `{}` has an invalid base_url", id))?;
            map.insert(
                id.clone(),
                Institution {
                    id: id.clone(),
                    base_url,
                },
            );
        }
        Ok(Institutions(Arc::new(map)))
    }
}

/// A known tenant and the address its backend answers on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Institution {
    pub id: InstitutionId,
    pub base_url: Url,
}

/// The process-wide set of institutions. Cheap to clone, never mutated.
#[derive(Debug, Clone, Default)]
pub struct Institutions(Arc<BTreeMap<InstitutionId, Institution>>);

impl Institutions {
    pub fn get(&self, id: &str) -> Option<&Institution> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstitutionId> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Institution> for Institutions {
    fn from_iter<T: IntoIterator<Item = Institution>>(iter: T) -> Self {
        Self(Arc::new(
            iter.into_iter().map(|i| (i.id.clone(), i)).collect(),
        ))
    }
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    if let Ok(p) = env::var("TEACH_GATE_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("teach-gate").join("config.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("teach-gate.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find a configuration file (pass --config, set TEACH_GATE_CONFIG or create ./teach-gate.json)"
    ))
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

fn expand_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = expand_env_vars(s),
        serde_json::Value::Array(items) => items.iter_mut().for_each(expand_value),
        serde_json::Value::Object(map) => map.values_mut().for_each(expand_value),
        _ => {}
    }
}
