//! Recipe resolution and listing.
//!
//! Bare names resolve against the recipes directory before being treated
//! as literal paths. Listing parses every recipe in the directory and
//! reports per-entry failures without aborting the listing.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::recipe::{Recipe, RecipeError, RecipeResult};

/// Loads recipes from a directory.
#[derive(Debug, Clone)]
pub struct RecipeStore {
    recipes_dir: PathBuf,
}

/// One row of `rayup list` output.
#[derive(Debug)]
pub struct RecipeSummary {
    pub file_name: String,
    pub recipe: RecipeResult<Recipe>,
}

impl RecipeStore {
    pub fn new(recipes_dir: impl Into<PathBuf>) -> Self {
        Self { recipes_dir: recipes_dir.into() }
    }

    pub fn recipes_dir(&self) -> &Path {
        &self.recipes_dir
    }

    /// Load a recipe by name or path.
    ///
    /// Search order: the literal path, then `<dir>/<name>`, then
    /// `<dir>/<name>.toml`. A miss reports every location searched.
    pub fn load(&self, name_or_path: &str) -> RecipeResult<Recipe> {
        let literal = Path::new(name_or_path);
        let mut candidates = vec![literal.to_path_buf()];
        candidates.push(self.recipes_dir.join(name_or_path));
        candidates.push(self.recipes_dir.join(format!("{name_or_path}.toml")));

        for candidate in &candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "recipe resolved");
                return load_file(candidate);
            }
        }

        Err(RecipeError::NotFound {
            name: name_or_path.to_string(),
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Parse every `.toml` recipe in the directory, sorted by file name.
    pub fn list(&self) -> Vec<RecipeSummary> {
        let Ok(entries) = std::fs::read_dir(&self.recipes_dir) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .map(|path| RecipeSummary {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                recipe: load_file(&path),
            })
            .collect()
    }
}

fn load_file(path: &Path) -> RecipeResult<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Recipe::from_toml_str(&content, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
schema_version = "1"
name = "glm-test"
container = "vllm-node"
command = "vllm serve model --port {port}"
description = "test recipe"
"#;

    fn store_with_recipe() -> (tempfile::TempDir, RecipeStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("glm-test.toml"), RECIPE).unwrap();
        let store = RecipeStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn loads_bare_name() {
        let (_dir, store) = store_with_recipe();
        let recipe = store.load("glm-test").unwrap();
        assert_eq!(recipe.name, "glm-test");
    }

    #[test]
    fn loads_name_with_extension() {
        let (_dir, store) = store_with_recipe();
        assert!(store.load("glm-test.toml").is_ok());
    }

    #[test]
    fn loads_literal_path() {
        let (dir, store) = store_with_recipe();
        let path = dir.path().join("glm-test.toml");
        assert!(store.load(&path.display().to_string()).is_ok());
    }

    #[test]
    fn not_found_lists_searched_paths() {
        let (_dir, store) = store_with_recipe();
        let err = store.load("nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("nope.toml"));
    }

    #[test]
    fn list_reports_broken_recipes_per_entry() {
        let (dir, store) = store_with_recipe();
        std::fs::write(dir.path().join("broken.toml"), "name = \"no version\"").unwrap();

        let summaries = store.list();
        assert_eq!(summaries.len(), 2);
        // Sorted by file name: broken first.
        assert!(summaries[0].recipe.is_err());
        assert!(summaries[1].recipe.is_ok());
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let store = RecipeStore::new("/nonexistent/recipes");
        assert!(store.list().is_empty());
    }
}
