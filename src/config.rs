use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the private state directory kept at the repository root.
pub const STATE_DIR: &str = ".repograph";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepographConfig {
    /// Store location; relative paths are resolved against the repository root
    pub database: Option<String>,
    /// Extra gitignore-style patterns excluded from indexing
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RepographConfig {
    pub fn database_path(&self, root: &Path) -> PathBuf {
        match &self.database {
            Some(db) => root.join(db),
            None => default_database_path_in(root),
        }
    }
}

pub fn default_config_path(root: &Path) -> PathBuf {
    root.join("repograph.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(STATE_DIR).join("index.db")
}

pub fn load_config(path: &Path) -> anyhow::Result<Option<RepographConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)?;
    let config: RepographConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RepographConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = format!("{STATE_DIR}/");

    let mut content = String::new();
    if gitignore_path.exists() {
        content = std::fs::read_to_string(&gitignore_path)?;
        if content.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(&entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}
