//! Mesh configuration loading.
//!
//! The file is a TOML rendition of [`MeshConfig`]. Every section and field
//! is optional; missing values fall back to the library defaults.
//!
//! ```toml
//! [paths]
//! max_paths_per_destination = 4
//!
//! [routing]
//! cost_metric = "latency"
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use hypha_protocol::config::MeshConfig;
use tracing::info;

/// Loads and validates the configuration. `None` yields the defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<MeshConfig> {
    let config = match path {
        None => {
            info!("no configuration file given, using defaults");
            MeshConfig::default()
        }
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            let config = parse(&contents)
                .with_context(|| format!("failed to parse config at {}", path.display()))?;
            info!(path = %path.display(), "configuration loaded");
            config
        }
    };

    config.validate().context("invalid mesh configuration")?;
    Ok(config)
}

pub fn parse(contents: &str) -> anyhow::Result<MeshConfig> {
    Ok(toml::from_str(contents)?)
}

/// Renders the effective configuration back to TOML.
pub fn render(config: &MeshConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypha_protocol::routing::CostMetric;
    use std::io::Write;

    #[test]
    fn missing_path_yields_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config, MeshConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[paths]\nmax_paths_per_destination = 5\n\n[routing]\ncost_metric = \"latency\"\n"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.paths.max_paths_per_destination, 5);
        assert_eq!(config.routing.cost_metric, CostMetric::Latency);
        assert_eq!(config.signals, MeshConfig::default().signals);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[topology]\nwarning_threshold = 10.0\ncritical_threshold = 40.0").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("invalid mesh configuration"));
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn rendered_config_parses_back() {
        let mut config = MeshConfig::default();
        config.growth.target_size = 40;
        let rendered = render(&config).unwrap();
        assert_eq!(parse(&rendered).unwrap(), config);
    }
}
