use crate::error::Result;
use crate::error::VaultError;
use crate::layout::VaultLayout;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for indexing and watching a vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Root directory holding the project directories
    pub vault_root: PathBuf,

    /// SQLite database holding the index
    pub database_path: PathBuf,

    /// Marker a directory name must start with to be treated as a project
    #[serde(default = "default_project_prefix")]
    pub project_prefix: String,

    /// Extension of document files, without the dot
    #[serde(default = "default_document_extension")]
    pub document_extension: String,

    /// Name of the per-project directory holding uploaded assets
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Quiet window before a burst of filesystem events is acted on
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum documents indexed concurrently during a scan
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Size of the SQLite connection pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Default number of search hits
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_project_prefix() -> String {
    "@".to_string()
}

fn default_document_extension() -> String {
    "json".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

fn default_max_connections() -> u32 {
    8
}

fn default_search_limit() -> usize {
    50
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_root: PathBuf::from("."),
            database_path: PathBuf::from(".vault").join("index.db"),
            project_prefix: default_project_prefix(),
            document_extension: default_document_extension(),
            assets_dir: default_assets_dir(),
            debounce_ms: default_debounce_ms(),
            max_concurrent: default_max_concurrent(),
            max_connections: default_max_connections(),
            search_limit: default_search_limit(),
        }
    }
}

impl VaultConfig {
    /// Config rooted at `vault_root` with the index stored inside it.
    pub fn for_vault(vault_root: impl Into<PathBuf>) -> Self {
        let vault_root = vault_root.into();
        Self {
            database_path: vault_root.join(".vault").join("index.db"),
            vault_root,
            ..Default::default()
        }
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VaultConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.project_prefix.is_empty() {
            return Err(VaultError::Config(
                "project_prefix must not be empty".to_string(),
            ));
        }

        if self.project_prefix.contains(['/', '\\']) {
            return Err(VaultError::Config(format!(
                "project_prefix must not contain path separators: {:?}",
                self.project_prefix
            )));
        }

        if self.document_extension.is_empty() || self.document_extension.starts_with('.') {
            return Err(VaultError::Config(format!(
                "document_extension must be a bare extension: {:?}",
                self.document_extension
            )));
        }

        if self.assets_dir.is_empty() || self.assets_dir.contains(['/', '\\']) {
            return Err(VaultError::Config(format!(
                "assets_dir must be a single directory name: {:?}",
                self.assets_dir
            )));
        }

        if self.debounce_ms == 0 {
            return Err(VaultError::Config("debounce_ms must be > 0".to_string()));
        }

        if self.max_concurrent == 0 {
            return Err(VaultError::Config("max_concurrent must be > 0".to_string()));
        }

        if self.max_connections == 0 {
            return Err(VaultError::Config("max_connections must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn layout(&self) -> VaultLayout {
        VaultLayout::new(
            &self.vault_root,
            &self.project_prefix,
            &self.document_extension,
            &self.assets_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.project_prefix, "@");
        assert_eq!(config.document_extension, "json");
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(config.max_concurrent > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = VaultConfig::default();
        config.debounce_ms = 0;
        assert!(config.validate().is_err());

        let mut config = VaultConfig::default();
        config.project_prefix = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = VaultConfig::default();
        config.document_extension = ".json".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vault.toml");
        std::fs::write(
            &path,
            "vault_root = \"/notes\"\ndatabase_path = \"/tmp/index.db\"\ndebounce_ms = 200\n",
        )
        .expect("write config");

        let config = VaultConfig::load(&path).expect("load");
        assert_eq!(config.vault_root, PathBuf::from("/notes"));
        assert_eq!(config.debounce_ms, 200);
        assert_eq!(config.assets_dir, "assets");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vault.toml");
        std::fs::write(
            &path,
            "vault_root = \"/notes\"\ndatabase_path = \"/tmp/index.db\"\nmax_concurrent = 0\n",
        )
        .expect("write config");

        assert!(matches!(
            VaultConfig::load(&path),
            Err(VaultError::Config(_))
        ));
    }
}
