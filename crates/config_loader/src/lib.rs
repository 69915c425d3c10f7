//! # Config Loader
//!
//! Camera session configuration loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate the result
//! - Produce a `SessionBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("Facing: {}", blueprint.camera.facing);
//! ```

mod parser;
mod validator;

pub use contracts::SessionBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Loads and checks [`SessionBlueprint`]s
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load, parse and validate a config file. The format follows the
    /// extension (`.toml` or `.json`).
    pub fn load_from_path(path: &Path) -> Result<SessionBlueprint, ContractError> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ContractError::config_parse("cannot determine file format from extension"))
            .and_then(|ext| {
                ConfigFormat::from_extension(ext)
                    .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
            })?;
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), ?format, bytes = content.len(), "loading session config");
        Self::load_from_str(&content, format)
    }

    /// Parse and validate in-memory config text.
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<SessionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Check an in-memory blueprint, e.g. after CLI overrides were applied
    pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}
