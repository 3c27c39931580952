//! Layered settings: optional TOML file, then `SDC__*` environment
//! variables. Command-line flags are applied on top by the caller.

use crate::logging::LoggingConfig;
use anyhow::Context;
use config::{Config, Environment, File};
use sdc_engine::EngineConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// `path` must exist when given; otherwise `sdc.toml` in the working
    /// directory is read if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("sdc").required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SDC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::default();
        assert!(settings.engine.show_submit_button);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn test_reads_toml_file() {
        let path = std::env::temp_dir().join(format!("sdc-settings-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[engine]\nenable_review_page = true\nlocale = \"de\"\n\n[logging]\njson = true"
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(settings.engine.enable_review_page);
        assert_eq!(settings.engine.locale.as_deref(), Some("de"));
        assert!(settings.logging.json);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/sdc.toml"))).is_err());
    }
}
