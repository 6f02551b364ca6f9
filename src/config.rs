//! Engine configuration.
//!
//! [`EngineConfig`] is an explicit value handed to the registry and the
//! mutation coordinator; nothing is read from process-wide state. Load it
//! from `config/config.toml` (section `[relations]`) or `LIFEGUARD__RELATIONS__*`
//! environment variables with `EngineConfig::load()`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Run validations on records saved as a consequence of a relation
    /// mutation (targets of has_many/has_one through an array)
    #[serde(default)]
    pub validate_dependents: bool,
    /// Default of `required` for belongs_to_many relations
    #[serde(default)]
    pub belongs_to_many_required_by_default: bool,
    /// Look up inverse relations by naming convention when none is declared
    #[serde(default = "default_automatic_inverse")]
    pub automatic_inverse: bool,
}

fn default_automatic_inverse() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_dependents: false,
            belongs_to_many_required_by_default: false,
            automatic_inverse: default_automatic_inverse(),
        }
    }
}

impl EngineConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("LIFEGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An existing but unreadable file is worth a warning; retry with env only
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LIFEGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_config(&settings)
    }

    /// Extract the `relations` section; a missing section yields the defaults
    pub fn from_config(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<EngineConfig>("relations") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Relation configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }
}
