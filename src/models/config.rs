use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default decompiler command shown to new users (CFR).
pub const DEFAULT_DECOMPILER_COMMAND: &str =
    "java -jar decompilers/cfr.jar {path_to_jar} --outputdir {out_path}";

/// User configuration from MDG Settings.yaml
///
/// Contains the decompiler command and the per-stage switches the main window exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "MDG_Settings", default)]
    pub mdg_settings: MdgSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdgSettings {
    #[serde(rename = "Decompiler Command", default = "default_decompiler_command")]
    pub decompiler_command: String,

    #[serde(rename = "Cache Enabled", default = "default_true")]
    pub cache_enabled: bool,

    #[serde(rename = "Deobfuscation Enabled", default = "default_true")]
    pub deobfuscation_enabled: bool,

    #[serde(rename = "Decompilation Enabled", default = "default_true")]
    pub decompilation_enabled: bool,

    #[serde(rename = "Decompiler Check Enabled", default = "default_true")]
    pub decompiler_check_enabled: bool,

    /// Seconds before the decompiler check is abandoned
    #[serde(rename = "Decompiler Check Timeout", default = "default_check_timeout")]
    pub decompiler_check_timeout: u64,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for MdgSettings {
    fn default() -> Self {
        Self {
            decompiler_command: default_decompiler_command(),
            cache_enabled: true,
            deobfuscation_enabled: true,
            decompilation_enabled: true,
            decompiler_check_enabled: true,
            decompiler_check_timeout: default_check_timeout(),
            debug_mode: false,
        }
    }
}

fn default_decompiler_command() -> String {
    DEFAULT_DECOMPILER_COMMAND.to_string()
}

fn default_true() -> bool {
    true
}

fn default_check_timeout() -> u64 {
    300
}

impl UserConfig {
    /// Build the immutable configuration for one initialisation run.
    pub fn to_init_config(&self) -> InitConfig {
        let settings = &self.mdg_settings;
        InitConfig {
            decompiler_command_template: settings.decompiler_command.clone(),
            cache_enabled: settings.cache_enabled,
            deobfuscation_stage_enabled: settings.deobfuscation_enabled,
            decompilation_stage_enabled: settings.decompilation_enabled,
            decompiler_validation_enabled: settings.decompiler_check_enabled,
            validation_timeout: Duration::from_secs(settings.decompiler_check_timeout),
        }
    }
}

/// Configuration for a single initialisation run
///
/// Populated once from [`UserConfig`] and never mutated while the run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    /// Command with `{path_to_jar}` and `{out_path}` placeholders
    pub decompiler_command_template: String,
    pub cache_enabled: bool,
    pub deobfuscation_stage_enabled: bool,
    pub decompilation_stage_enabled: bool,
    pub decompiler_validation_enabled: bool,
    pub validation_timeout: Duration,
}

impl Default for InitConfig {
    fn default() -> Self {
        UserConfig::default().to_init_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdg_settings_defaults() {
        let settings = MdgSettings::default();
        assert!(settings.cache_enabled);
        assert!(settings.deobfuscation_enabled);
        assert!(settings.decompilation_enabled);
        assert!(settings.decompiler_check_enabled);
        assert_eq!(settings.decompiler_check_timeout, 300);
        assert!(settings.decompiler_command.contains("{path_to_jar}"));
        assert!(settings.decompiler_command.contains("{out_path}"));
    }

    #[test]
    fn test_to_init_config() {
        let mut config = UserConfig::default();
        config.mdg_settings.cache_enabled = false;
        config.mdg_settings.decompiler_check_timeout = 12;

        let init = config.to_init_config();
        assert!(!init.cache_enabled);
        assert!(init.decompilation_stage_enabled);
        assert_eq!(init.validation_timeout, Duration::from_secs(12));
        assert_eq!(init.decompiler_command_template, DEFAULT_DECOMPILER_COMMAND);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "MDG_Settings:\n  Cache Enabled: false\n";
        let config: UserConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert!(!config.mdg_settings.cache_enabled);
        assert!(config.mdg_settings.deobfuscation_enabled);
        assert_eq!(config.mdg_settings.decompiler_check_timeout, 300);
    }
}
