//! Launch parameter layering.
//!
//! Parameters are built once, by explicit merge, and never re-derived:
//! recipe defaults, then CLI overrides, then the execution-mode
//! adjustment. Solo mode pins `tensor_parallel` to 1 — the adjustment is
//! the highest-precedence layer.

use std::collections::BTreeMap;

use rayup_core::ExecMode;
use tracing::{debug, warn};

use crate::recipe::Recipe;

/// Template parameter pinned to 1 in solo mode.
pub const TENSOR_PARALLEL: &str = "tensor_parallel";

/// Named CLI overrides for recognized launch parameters.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub tensor_parallel: Option<u32>,
    pub gpu_memory_utilization: Option<f64>,
    pub max_model_len: Option<u64>,
}

impl Overrides {
    /// The override value for a parameter key, rendered, if set.
    pub fn value_of(&self, key: &str) -> Option<String> {
        match key {
            "port" => self.port.map(|v| v.to_string()),
            "host" => self.host.clone(),
            "tensor_parallel" => self.tensor_parallel.map(|v| v.to_string()),
            "gpu_memory_utilization" => self.gpu_memory_utilization.map(|v| v.to_string()),
            "max_model_len" => self.max_model_len.map(|v| v.to_string()),
            _ => None,
        }
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.value_of(key).is_some()
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        [
            "port",
            "host",
            "tensor_parallel",
            "gpu_memory_utilization",
            "max_model_len",
        ]
        .into_iter()
        .filter_map(|k| self.value_of(k).map(|v| (k, v)))
        .collect()
    }
}

/// The fully-layered parameter table used for template substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamTable {
    values: BTreeMap<String, String>,
}

impl ParamTable {
    /// Layer recipe defaults, CLI overrides, and the mode adjustment.
    pub fn layered(recipe: &Recipe, overrides: &Overrides, mode: &ExecMode) -> Self {
        let mut values: BTreeMap<String, String> = recipe
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), render_value(v)))
            .collect();

        for (key, value) in overrides.entries() {
            values.insert(key.to_string(), value);
        }

        if mode.is_solo() {
            if let Some(prev) = values.get(TENSOR_PARALLEL) {
                if prev != "1" {
                    warn!(
                        previous = %prev,
                        "solo mode pins tensor_parallel to 1"
                    );
                }
            }
            values.insert(TENSOR_PARALLEL.to_string(), "1".to_string());
        }

        debug!(params = values.len(), %mode, "launch parameters layered");
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parameter names, for unresolved-placeholder diagnostics.
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

/// Render a TOML default as the string that lands in the command.
fn render_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
