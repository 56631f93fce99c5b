use crate::models::{MdgSettings, UserConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigError, Environment};
use std::fs;

/// Prefix of environment variables that override settings, e.g. `MDG_CACHE_ENABLED=false`
pub const ENV_PREFIX: &str = "MDG";

/// Configuration manager for loading and saving the YAML settings file.
///
/// Manages `MDG Settings.yaml` inside the configuration directory. Values from the
/// file can be overridden per run through `MDG_*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join("MDG Settings.yaml"),
            config_dir,
        })
    }

    /// Load the user configuration with overrides from the process environment.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        self.load_user_config_with_env(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load the user configuration, applying overrides from `env`.
    ///
    /// A missing settings file yields defaults.
    pub fn load_user_config_with_env(&self, env: Environment) -> Result<UserConfig> {
        let mut config = if self.user_config_path.exists() {
            let file_contents = fs::read_to_string(&self.user_config_path).with_context(|| {
                format!("Failed to read user config: {}", self.user_config_path)
            })?;

            let config: UserConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
                format!("Failed to parse user config: {}", self.user_config_path)
            })?;

            tracing::info!("Loaded user config from {}", self.user_config_path);
            config
        } else {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
            UserConfig::default()
        };

        let overrides = Config::builder()
            .add_source(env)
            .build()
            .context("Failed to read environment overrides")?;
        apply_overrides(&mut config.mdg_settings, &overrides)?;

        Ok(config)
    }

    /// Save the user configuration file.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}

/// Read an optional key; absent keys are `None`, malformed ones are errors.
fn optional<T>(value: Result<T, ConfigError>, key: &str) -> Result<Option<T>> {
    match value {
        Ok(value) => {
            tracing::info!("Setting {} overridden from environment", key);
            Ok(Some(value))
        }
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Invalid override for {}_{}", ENV_PREFIX, key.to_uppercase())),
    }
}

fn apply_overrides(settings: &mut MdgSettings, overrides: &Config) -> Result<()> {
    if let Some(command) = optional(overrides.get_string("decompiler_command"), "decompiler_command")? {
        settings.decompiler_command = command;
    }
    if let Some(enabled) = optional(overrides.get_bool("cache_enabled"), "cache_enabled")? {
        settings.cache_enabled = enabled;
    }
    if let Some(enabled) = optional(overrides.get_bool("deobfuscation_enabled"), "deobfuscation_enabled")? {
        settings.deobfuscation_enabled = enabled;
    }
    if let Some(enabled) = optional(overrides.get_bool("decompilation_enabled"), "decompilation_enabled")? {
        settings.decompilation_enabled = enabled;
    }
    if let Some(enabled) =
        optional(overrides.get_bool("decompiler_check_enabled"), "decompiler_check_enabled")?
    {
        settings.decompiler_check_enabled = enabled;
    }
    if let Some(secs) =
        optional(overrides.get_int("decompiler_check_timeout"), "decompiler_check_timeout")?
    {
        settings.decompiler_check_timeout = u64::try_from(secs)
            .with_context(|| format!("Negative decompiler check timeout: {}", secs))?;
    }
    if let Some(debug) = optional(overrides.get_bool("debug_mode"), "debug_mode")? {
        settings.debug_mode = debug;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_load_missing_uses_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let loaded = manager.load_user_config_with_env(env(&[])).unwrap();
        assert_eq!(loaded, UserConfig::default());
    }

    #[test]
    fn test_load_save_user_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = UserConfig::default();
        config.mdg_settings.decompilation_enabled = false;
        config.mdg_settings.decompiler_command = "fernflower {path_to_jar} {out_path}".to_string();
        manager.save_user_config(&config).unwrap();

        let loaded = manager.load_user_config_with_env(env(&[])).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        manager.save_user_config(&UserConfig::default()).unwrap();

        let loaded = manager
            .load_user_config_with_env(env(&[
                ("MDG_CACHE_ENABLED", "false"),
                ("MDG_DECOMPILER_CHECK_TIMEOUT", "30"),
                ("MDG_DECOMPILER_COMMAND", "cfr {path_to_jar} --outputdir {out_path}"),
            ]))
            .unwrap();

        assert!(!loaded.mdg_settings.cache_enabled);
        assert_eq!(loaded.mdg_settings.decompiler_check_timeout, 30);
        assert_eq!(
            loaded.mdg_settings.decompiler_command,
            "cfr {path_to_jar} --outputdir {out_path}"
        );
        assert!(loaded.mdg_settings.deobfuscation_enabled);
    }

    #[test]
    fn test_invalid_env_override_is_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        let result = manager.load_user_config_with_env(env(&[("MDG_CACHE_ENABLED", "sometimes")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.user_config_path(), "MDG_Settings: [not, a, map]").unwrap();

        assert!(manager.load_user_config_with_env(env(&[])).is_err());
    }
}
