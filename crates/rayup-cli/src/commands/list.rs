//! `rayup list` — recipe directory listing.

use anyhow::Result;
use rayup_recipe::RecipeStore;

use super::Context;

pub fn list(ctx: &Context) -> Result<()> {
    let store = RecipeStore::new(&ctx.recipes_dir);
    let summaries = store.list();

    if summaries.is_empty() {
        println!("No recipes found in {}.", ctx.recipes_dir.display());
        return Ok(());
    }

    println!("Available recipes:");
    println!();
    for summary in summaries {
        match summary.recipe {
            Ok(recipe) => {
                println!("  {}", summary.file_name);
                println!("    Name: {}", recipe.name);
                if let Some(desc) = &recipe.description {
                    println!("    Description: {desc}");
                }
                if let Some(model) = &recipe.model {
                    println!("    Model: {model}");
                }
                if recipe.cluster_only {
                    println!("    Cluster only: Yes");
                }
                if recipe.solo_only {
                    println!("    Solo only: Yes");
                }
                println!("    Container: {}", recipe.container);
                if !recipe.build_args.is_empty() {
                    println!("    Build args: {}", recipe.build_args.join(" "));
                }
                if !recipe.mods.is_empty() {
                    println!("    Mods: {}", recipe.mods.join(", "));
                }
            }
            Err(e) => {
                println!("  {} (error loading: {e})", summary.file_name);
            }
        }
        println!();
    }
    Ok(())
}
