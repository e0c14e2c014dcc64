//! Layered YAML configuration loading + secret resolution for the registrar.
//!
//! Config files are loaded in merge order (later files override earlier
//! ones via deep-merge), canonicalized to stable-key-order JSON, and hashed
//! so operators can confirm which configuration a running process loaded.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deserialized configuration, before secret resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    pub logfile: String,
    pub subdomain_registrar_db_path: String,
    pub lockfile: String,
    #[serde(default = "default_tx_limit")]
    pub tx_limit: i64,
    #[serde(default = "default_tx_frequency")]
    pub tx_frequency: u64,
    #[serde(default = "default_bind_address")]
    pub api_bind_address: String,
    #[serde(default = "default_bind_port")]
    pub api_bind_port: u16,
    pub core_api_endpoint: String,
    /// Literal bearer token. Mutually exclusive in practice with
    /// `core_api_authentication_env`; if both are present the literal wins.
    #[serde(default)]
    pub core_api_authentication: Option<String>,
    /// Name of an environment variable holding the bearer token, so the
    /// token itself never needs to live in a checked-in YAML file.
    #[serde(default)]
    pub core_api_authentication_env: Option<String>,
}

fn default_tx_limit() -> i64 {
    100
}

fn default_tx_frequency() -> u64 {
    600
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8394
}

/// Fully resolved configuration, with the bearer token in hand.
///
/// `Debug` redacts `core_api_authentication` so the token never lands in
/// logs or panics.
#[derive(Clone)]
pub struct RegistrarConfig {
    pub logfile: String,
    pub subdomain_registrar_db_path: String,
    pub lockfile: String,
    pub tx_limit: i64,
    pub tx_frequency: u64,
    pub api_bind_address: String,
    pub api_bind_port: u16,
    pub core_api_endpoint: String,
    pub core_api_authentication: String,
    pub config_hash: String,
}

impl std::fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("logfile", &self.logfile)
            .field("subdomain_registrar_db_path", &self.subdomain_registrar_db_path)
            .field("lockfile", &self.lockfile)
            .field("tx_limit", &self.tx_limit)
            .field("tx_frequency", &self.tx_frequency)
            .field("api_bind_address", &self.api_bind_address)
            .field("api_bind_port", &self.api_bind_port)
            .field("core_api_endpoint", &self.core_api_endpoint)
            .field("core_api_authentication", &"<REDACTED>")
            .field("config_hash", &self.config_hash)
            .finish()
    }
}

/// Result of loading and canonicalizing one or more layered YAML files.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + deep-merge YAML files in order, then canonicalize to JSON and hash.
/// Later paths override earlier ones.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Load layered YAML config files and resolve them into a [`RegistrarConfig`],
/// including bearer-token resolution.
///
/// # Errors
/// Fails (startup-fatal) if a required field is missing, or if
/// `core_api_authentication_env` names a variable that is unset/blank and no
/// literal `core_api_authentication` was also given.
pub fn load_registrar_config(paths: &[&str]) -> Result<RegistrarConfig> {
    let loaded = load_layered_yaml(paths)?;
    let raw: RawConfig = serde_json::from_value(loaded.config_json.clone())
        .context("config does not match the expected schema")?;

    let token = match (raw.core_api_authentication, raw.core_api_authentication_env) {
        (Some(literal), _) if !literal.trim().is_empty() => literal,
        (_, Some(var_name)) => resolve_env(&var_name).with_context(|| {
            format!("core_api_authentication_env names '{var_name}', which is unset or empty")
        })?,
        _ => bail!("config must set core_api_authentication or core_api_authentication_env"),
    };

    Ok(RegistrarConfig {
        logfile: raw.logfile,
        subdomain_registrar_db_path: raw.subdomain_registrar_db_path,
        lockfile: raw.lockfile,
        tx_limit: raw.tx_limit,
        tx_frequency: raw.tx_frequency,
        api_bind_address: raw.api_bind_address,
        api_bind_port: raw.api_bind_port,
        core_api_endpoint: raw.core_api_endpoint,
        core_api_authentication: token,
        config_hash: loaded.config_hash,
    })
}

/// Resolve a named environment variable. `None` if unset or blank — callers
/// report the variable NAME in errors, never attempt to read the value back.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Convenience used by the daemon/CLI to ensure the parent directory of a
/// configured path exists before the component that owns it starts.
pub fn ensure_parent_dir(path: &str) -> Result<()> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}
