use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "typography.yml";
pub const DEFAULT_RULES_FILE: &str = "typography-rules.yml";

/// Top-level configuration shared by the CLI and the language server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule store location, relative to the config file's directory.
    pub rules_file: PathBuf,
    /// File extensions scanned when walking directories.
    pub extensions: Vec<String>,
    pub ignore_globs: Vec<String>,
    /// Rule ids never applied, whatever the store says.
    pub disabled_rules: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            extensions: vec!["md".into(), "markdown".into(), "mdx".into(), "txt".into()],
            ignore_globs: vec![
                "**/.git/**".into(),
                "**/node_modules/**".into(),
                "**/target/**".into(),
                "**/dist/**".into(),
            ],
            disabled_rules: Vec::new(),
        }
    }
}

impl Config {
    pub fn rules_path(&self, root: &Path) -> PathBuf {
        if self.rules_file.is_absolute() {
            self.rules_file.clone()
        } else {
            root.join(&self.rules_file)
        }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Loads `path` if it exists, defaults otherwise. Also returns the directory
/// relative paths in the config resolve against.
pub fn load_config(path: &Path) -> anyhow::Result<(Config, PathBuf)> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let cfg: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid config structure in {}", path.display()))?
        };
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => env::current_dir().context("Failed to resolve working directory")?,
        };
        Ok((cfg, dir))
    } else {
        let dir = env::current_dir().context("Failed to resolve working directory")?;
        Ok((Config::default(), dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str("disabled_rules: [en_dash]\n").unwrap();
        assert_eq!(cfg.disabled_rules, vec!["en_dash"]);
        assert_eq!(cfg.rules_file, PathBuf::from(DEFAULT_RULES_FILE));
        assert!(cfg.is_supported(Path::new("notes/README.MD")));
        assert!(!cfg.is_supported(Path::new("main.rs")));
    }

    #[test]
    fn rules_path_resolves_against_root() {
        let cfg = Config::default();
        assert_eq!(
            cfg.rules_path(Path::new("/work")),
            PathBuf::from("/work").join(DEFAULT_RULES_FILE)
        );
    }
}
