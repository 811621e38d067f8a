//! pdk-config
//!
//! Layered YAML configuration for the ledger service. Later documents
//! override earlier ones (deep merge on mappings); the merged result is
//! hashed over its canonical JSON form so two deployments can assert
//! they run the same effective config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Typed ledger settings extracted from the merged config.
///
/// Every field has a default, so an empty config is valid. Unknown keys
/// elsewhere in the document are tolerated — they may belong to other
/// consumers (the request-handling layer, deploy tooling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Cash granted to a newly opened account, in whole currency units.
    pub starting_cash_units: i64,
    /// Default `history()` page size when the caller supplies none.
    pub history_default_limit: usize,
    /// How many times `execute()` re-runs its load/apply/save cycle
    /// after an optimistic-concurrency conflict before giving up.
    pub max_conflict_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_cash_units: 50_000_000,
            history_default_limit: 50,
            max_conflict_retries: 3,
        }
    }
}

impl LedgerConfig {
    /// Extract the `ledger` section of a merged config document.
    /// A missing section yields the defaults.
    pub fn from_config_json(config: &Value) -> Result<Self> {
        match config.pointer("/ledger") {
            Some(section) => serde_json::from_value(section.clone())
                .context("invalid /ledger section in config"),
            None => Ok(Self::default()),
        }
    }
}

/// The merged, hashed configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Merge YAML docs in order: earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
