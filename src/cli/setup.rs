use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Example configuration shipped with the binary.
const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Creates a default configuration file with example content at the default location
pub fn setup() -> Result<()> {
    let path = AppConfig::default_config_path()?;
    setup_at_path(&path)?;
    println!("Created configuration at {}", path.display());
    Ok(())
}

/// Creates a default configuration file with example content at the specified path
pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::{Category, SeriesId};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_setup_creates_config_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nested").join("config.yaml");

        setup_at_path(&config_path)?;

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path)?;
        assert!(content.contains("providers:"));
        assert!(content.contains("series:"));
        assert!(content.contains("analysis:"));
        assert!(content.contains("# Example configuration file for xasset"));

        // The written file loads like any user config
        let config = AppConfig::load_from_path(&config_path)?;
        assert!(!config.series.is_empty());

        Ok(())
    }

    #[test]
    fn test_setup_fails_if_config_exists() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");

        std::fs::write(&config_path, "test")?;

        let result = setup_at_path(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&config_path)?, "test");

        Ok(())
    }

    #[test]
    fn test_example_config_is_valid() -> Result<()> {
        let config: AppConfig = serde_yaml::from_str(EXAMPLE_CONFIG)
            .context("Failed to parse example config as YAML")?;

        config.validate()?;
        assert!(config.providers.fred.is_some());
        assert!(config.providers.yahoo.is_some());
        assert_eq!(config.series.len(), 18);
        assert_eq!(
            config.series_spec("M2SL")?.id,
            SeriesId::from("M2 Money Supply")
        );
        assert_eq!(config.series_spec("gold")?.category, Category::Asset);
        for driver in &config.analysis.drivers {
            assert_eq!(config.series_spec(driver.as_str())?.category, Category::Macro);
        }
        assert_eq!(config.analysis.events.len(), 3);
        assert_eq!(config.stories.len(), 5);
        assert!(config.story("money printer (covid)").is_ok());
        assert!(config.basket("Hard Money")?.denominator().is_some());

        Ok(())
    }
}
