//! Updates to `database/migrations/mod.rs`.

use anyhow::{Context, Result};
use std::path::Path;

use super::templates::registry_module;

/// Declare a migration module in the registry file, creating the file if needed.
///
/// Returns `false` if the module was already declared.
pub fn add_migration_module(registry_path: &Path, module_name: &str) -> Result<bool> {
    let content = if registry_path.exists() {
        std::fs::read_to_string(registry_path)
            .with_context(|| format!("Failed to read {}", registry_path.display()))?
    } else {
        registry_module()
    };

    let Some(new_content) = insert_module_declaration(&content, module_name) else {
        return Ok(false);
    };

    std::fs::write(registry_path, new_content)
        .with_context(|| format!("Failed to write {}", registry_path.display()))?;
    Ok(true)
}

/// Insert `mod <name>;` after the last module declaration, or at the end.
fn insert_module_declaration(content: &str, module_name: &str) -> Option<String> {
    let mod_decl = format!("mod {module_name};");
    if content.lines().any(|line| line.trim() == mod_decl) {
        return None;
    }

    let mut offset = 0;
    let mut insert_pos = None;
    for line in content.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if (trimmed.starts_with("mod ") || trimmed.starts_with("pub mod ")) && trimmed.ends_with(';') {
            insert_pos = Some(offset);
        }
    }

    let mut new_content = String::with_capacity(content.len() + mod_decl.len() + 1);
    match insert_pos {
        Some(pos) => {
            new_content.push_str(&content[..pos]);
            if !new_content.ends_with('\n') {
                new_content.push('\n');
            }
            new_content.push_str(&mod_decl);
            new_content.push('\n');
            new_content.push_str(&content[pos..]);
        }
        None => {
            new_content.push_str(content);
            if !new_content.is_empty() && !new_content.ends_with('\n') {
                new_content.push('\n');
            }
            new_content.push_str(&mod_decl);
            new_content.push('\n');
        }
    }
    Some(new_content)
}
