//! Launch command synthesis.
//!
//! Renders the recipe's command template into a complete bash launch
//! script. Mode-sensitive rewriting happens strictly before placeholder
//! substitution; pass-through arguments are appended verbatim after it.
//! Unresolved placeholders are hard errors — nothing is silently
//! substituted with an empty string.

use std::sync::OnceLock;

use rayup_core::ExecMode;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::params::{Overrides, ParamTable};
use crate::recipe::Recipe;

/// The flag that selects the distributed execution backend. Removed from
/// the rendered command entirely in solo mode.
pub const DISTRIBUTED_BACKEND_FLAG: &str = "--distributed-executor-backend";

/// Pass-through flags that shadow named overrides, and the parameter
/// each one competes with.
const FLAG_OVERRIDES: &[(&str, &str)] = &[
    ("--port", "port"),
    ("--host", "host"),
    ("--tensor-parallel-size", "tensor_parallel"),
    ("-tp", "tensor_parallel"),
    ("--gpu-memory-utilization", "gpu_memory_utilization"),
    ("--max-model-len", "max_model_len"),
];

/// Result type alias for rendering.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while rendering the launch command.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unresolved placeholder {{{placeholder}}} in command template (available: {available})")]
    UnresolvedPlaceholder { placeholder: String, available: String },

    #[error("malformed command template near `{near}`: unclosed placeholder")]
    MalformedTemplate { near: String },
}

/// A rendered launch script plus anything the user must be told.
#[derive(Debug, Clone)]
pub struct LaunchScript {
    /// The complete bash script to run inside the container.
    pub script: String,
    /// The final workload command line (last section of the script).
    pub command: String,
    /// Duplicate-argument warnings; printed, never fatal.
    pub warnings: Vec<String>,
}

/// Render the launch script for a recipe.
///
/// `passthrough` tokens are appended in caller order after all
/// substitution. `overrides` is consulted only for duplicate-argument
/// detection — the values themselves were already layered into `params`.
pub fn render(
    recipe: &Recipe,
    params: &ParamTable,
    overrides: &Overrides,
    passthrough: &[String],
    mode: &ExecMode,
) -> RenderResult<LaunchScript> {
    let mut template = recipe.command.clone();

    // Mode rewriting first: in solo mode the distributed-backend flag
    // must not survive into the rendered output.
    if mode.is_solo() {
        template = strip_distributed_backend(&template);
    }

    let mut command = substitute(&template, params)?;

    let warnings = duplicate_warnings(overrides, passthrough);
    for warning in &warnings {
        warn!("{warning}");
    }

    if !passthrough.is_empty() {
        let extra = passthrough.join(" ");
        let trimmed = command.trim_end();
        command = if let Some(body) = trimmed.strip_suffix('\\') {
            // Keep multi-line continuations intact.
            format!("{} \\\n    {extra}", body.trim_end())
        } else {
            format!("{trimmed} {extra}")
        };
    }

    let command = command.trim().to_string();

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("# Generated from recipe: {}", recipe.name),
        String::new(),
    ];
    if !recipe.env.is_empty() {
        lines.push("# Environment variables".to_string());
        for (key, value) in &recipe.env {
            lines.push(format!("export {key}=\"{value}\""));
        }
        lines.push(String::new());
    }
    lines.push("# Run the model".to_string());
    lines.push(command.clone());
    lines.push(String::new());

    Ok(LaunchScript {
        script: lines.join("\n"),
        command,
        warnings,
    })
}

/// Remove the distributed-backend flag (and its value) from a template.
///
/// Multi-line commands drop whole lines containing the flag, matching
/// the backslash-continuation layout recipes use; any remaining inline
/// occurrence is stripped by pattern.
fn strip_distributed_backend(template: &str) -> String {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    let inline = INLINE.get_or_init(|| {
        Regex::new(r"\s*--distributed-executor-backend(?:=\S+|\s+[^-\s]\S*)?").unwrap()
    });

    let kept: Vec<&str> = template
        .lines()
        .filter(|line| !line.contains(DISTRIBUTED_BACKEND_FLAG) || !line.trim_start().starts_with('-'))
        .collect();
    let joined = kept.join("\n");
    let stripped = inline.replace_all(&joined, "");

    // Dropping the last line must not leave a dangling continuation.
    stripped
        .trim_end()
        .trim_end_matches('\\')
        .trim_end()
        .to_string()
}

/// Substitute `{name}` placeholders; `{{` and `}}` are literal braces.
fn substitute(template: &str, params: &ParamTable) -> RenderResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) if ch.is_alphanumeric() || ch == '_' => name.push(ch),
                        _ => {
                            return Err(RenderError::MalformedTemplate {
                                near: format!("{{{name}"),
                            });
                        }
                    }
                }
                match params.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(RenderError::UnresolvedPlaceholder {
                            placeholder: name,
                            available: params.keys().join(", "),
                        });
                    }
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Warnings for pass-through flags that compete with named overrides.
///
/// Both `--flag value` and `--flag=value` forms are recognized. The
/// appended value wins in the final command; the user is told about
/// both.
fn duplicate_warnings(overrides: &Overrides, passthrough: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();

    for (i, token) in passthrough.iter().enumerate() {
        let (flag, inline_value) = match token.split_once('=') {
            Some((f, v)) => (f, Some(v.to_string())),
            None => (token.as_str(), None),
        };

        let Some((_, key)) = FLAG_OVERRIDES.iter().find(|(f, _)| *f == flag) else {
            continue;
        };
        let Some(override_value) = overrides.value_of(key) else {
            continue;
        };

        let appended = inline_value
            .or_else(|| passthrough.get(i + 1).cloned())
            .unwrap_or_default();
        warnings.push(format!(
            "pass-through `{flag}` duplicates the --{} override \
             (override: {override_value}, appended: {appended}); the appended value wins",
            key.replace('_', "-"),
        ));
    }

    warnings
}
