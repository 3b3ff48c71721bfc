use std::path::{Path, PathBuf};

use tracing::info;
use wadesk_common::{Error, Result};

use crate::model::AppConfig;

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".wadesk"));
        let xdg_config = dirs::config_dir().map(|c| c.join("wadesk"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                if xdg.exists() {
                    xdg
                } else if home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".wadesk"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory for the SQLite database, honouring `data_dir` when set.
    pub fn data_dir(&self, config: &AppConfig) -> PathBuf {
        config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("data"))
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join("config.yml").exists() || self.config_dir.join("config.toml").exists()
    }

    /// Load the config file and apply `WADESK_*` environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = self.load_file()?;
        apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    pub fn ensure_dirs(&self, config: &AppConfig) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.data_dir(config)];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

/// Overlay environment values onto a loaded config. Empty values are ignored.
fn apply_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = get("WADESK_HOST") {
        config.gateway.host = host;
    }
    if let Some(port) = get("WADESK_PORT") {
        config.gateway.port = port
            .parse()
            .map_err(|_| Error::Config(format!("WADESK_PORT is not a valid port: {port}")))?;
    }
    if let Some(token) = get("WADESK_WHATSAPP_VERIFY_TOKEN") {
        config.whatsapp.webhook_verify_token = Some(token);
    }
    if let Some(secret) = get("WADESK_WHATSAPP_APP_SECRET") {
        config.whatsapp.app_secret = Some(secret);
    }
    if let Some(base) = get("WADESK_GRAPH_API_BASE") {
        config.whatsapp.api_base_url = base;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigLoader, apply_overrides};
    use crate::model::AppConfig;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn load_returns_default_when_no_config_exists() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let loader = ConfigLoader::with_dir(dir.path());
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.whatsapp.request_timeout_secs, 15);
        assert!(
            config
                .tenancy
                .public_prefixes
                .iter()
                .any(|p| p == "/api/webhooks")
        );
    }

    #[test]
    fn load_prefers_yaml_over_toml_when_both_exist() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        fs::write(
            dir.path().join("config.yml"),
            "gateway:\n  host: \"0.0.0.0\"\n  port: 4001\n",
        )
        .expect("failed to write yaml config");
        fs::write(
            dir.path().join("config.toml"),
            "[gateway]\nhost = \"127.0.0.2\"\nport = 4999\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(dir.path());
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 4001);
    }

    #[test]
    fn load_reads_whatsapp_section_from_toml() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        fs::write(
            dir.path().join("config.toml"),
            "[whatsapp]\nrequest_timeout_secs = 20\napp_secret = \"shh\"\n\n[tenancy]\nbase_domain = \"wadesk.test\"\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(dir.path());
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.whatsapp.request_timeout_secs, 20);
        assert_eq!(config.whatsapp.app_secret.as_deref(), Some("shh"));
        assert_eq!(
            config.whatsapp.api_base_url,
            "https://graph.facebook.com/v21.0"
        );
        assert_eq!(config.tenancy.base_domain.as_deref(), Some("wadesk.test"));
        assert!(!config.tenancy.public_prefixes.is_empty());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WADESK_PORT", "8081"),
            ("WADESK_WHATSAPP_VERIFY_TOKEN", "from-env"),
            ("WADESK_WHATSAPP_APP_SECRET", ""),
        ]);
        let mut config = AppConfig::default();

        apply_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.gateway.port, 8081);
        assert_eq!(
            config.whatsapp.webhook_verify_token.as_deref(),
            Some("from-env")
        );
        assert!(config.whatsapp.app_secret.is_none());
    }

    #[test]
    fn env_override_rejects_bad_port() {
        let mut config = AppConfig::default();
        let result = apply_overrides(&mut config, |k| {
            (k == "WADESK_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn data_dir_defaults_under_config_dir() {
        let loader = ConfigLoader::with_dir("/tmp/wadesk-conf");
        let config = AppConfig::default();
        assert_eq!(
            loader.data_dir(&config),
            std::path::PathBuf::from("/tmp/wadesk-conf/data")
        );
    }
}
