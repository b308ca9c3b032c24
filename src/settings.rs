use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Tunables for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identity map insertions between two sweeps of dead entries.
    pub identity_sweep_interval: usize,
    /// Whether new beans take part in `save_all` unless told otherwise.
    pub auto_save: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identity_sweep_interval: 1000,
            auto_save: true,
        }
    }
}

impl EngineConfig {
    /// Layers the defaults, an optional file (format taken from its extension)
    /// and `ROWKEEPER_*` environment variables, later layers winning.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = EngineConfig::default();
        let mut builder = Config::builder()
            .set_default(
                "identity_sweep_interval",
                defaults.identity_sweep_interval as i64,
            )?
            .set_default("auto_save", defaults.auto_save)?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("ROWKEEPER"));
        Ok(builder.build()?.try_deserialize()?)
    }
}
