//! The recipe document.
//!
//! Required keys: `schema_version`, `name`, `container`, `command`.
//! Unknown keys are ignored so newer recipes keep loading on older
//! builds; an unsupported-but-present `schema_version` only warns.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Schema versions this build understands.
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1"];

/// Result type alias for recipe operations.
pub type RecipeResult<T> = Result<T, RecipeError>;

/// Errors raised while loading a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("recipe not found: {name} (searched: {searched})")]
    NotFound { name: String, searched: String },

    #[error("failed to read recipe {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("recipe missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("recipe '{name}' sets both cluster_only and solo_only; it can run in no mode")]
    ConflictingConstraints { name: String },
}

/// Raw document shape — everything optional so missing required fields
/// surface as [`RecipeError::MissingField`] rather than a serde error.
#[derive(Debug, Deserialize)]
struct RawRecipe {
    schema_version: Option<toml::Value>,
    name: Option<String>,
    container: Option<String>,
    command: Option<String>,
    description: Option<String>,
    model: Option<String>,
    #[serde(default)]
    cluster_only: bool,
    #[serde(default)]
    solo_only: bool,
    #[serde(default)]
    build_args: Vec<String>,
    #[serde(default)]
    mods: Vec<String>,
    #[serde(default)]
    defaults: BTreeMap<String, toml::Value>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// A validated, immutable workload recipe.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub schema_version: String,
    pub name: String,
    pub container: String,
    pub command: String,
    pub description: Option<String>,
    pub model: Option<String>,
    pub cluster_only: bool,
    pub solo_only: bool,
    pub build_args: Vec<String>,
    pub mods: Vec<String>,
    pub defaults: BTreeMap<String, toml::Value>,
    pub env: BTreeMap<String, String>,
}

impl Recipe {
    /// Parse and validate a recipe document.
    ///
    /// `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &str) -> RecipeResult<Self> {
        let raw: RawRecipe = toml::from_str(content).map_err(|source| RecipeError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let schema_version = match raw.schema_version {
            Some(toml::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => return Err(RecipeError::MissingField { field: "schema_version" }),
        };
        let name = raw.name.ok_or(RecipeError::MissingField { field: "name" })?;
        let container = raw
            .container
            .ok_or(RecipeError::MissingField { field: "container" })?;
        let command = raw
            .command
            .ok_or(RecipeError::MissingField { field: "command" })?;

        if raw.cluster_only && raw.solo_only {
            return Err(RecipeError::ConflictingConstraints { name });
        }

        if !SUPPORTED_SCHEMA_VERSIONS.contains(&schema_version.as_str()) {
            warn!(
                recipe = %name,
                version = %schema_version,
                supported = ?SUPPORTED_SCHEMA_VERSIONS,
                "recipe schema version is not supported by this build; continuing best-effort"
            );
        }

        Ok(Self {
            schema_version,
            name,
            container,
            command,
            description: raw.description,
            model: raw.model,
            cluster_only: raw.cluster_only,
            solo_only: raw.solo_only,
            build_args: raw.build_args,
            mods: raw.mods,
            defaults: raw.defaults,
            env: raw.env,
        })
    }
}
