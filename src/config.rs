use anyhow::{Context, Result};
use crate::storage;
use facerec_vision::orb::{MAX_LEVELS, MAX_PATCH_SIZE};
use facerec_vision::OrbParams;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("FACEREC_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("", "", "facerec")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facerec.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gallery_dir: PathBuf,
    pub extension: String,
    /// Hamming distance up to which a descriptor pair counts as similar
    pub match_radius: u32,
    /// A best match must score strictly above this to be accepted
    pub error_threshold: u32,
    pub orb: OrbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_dir: PathBuf::from("Database"),
            extension: "png".to_string(),
            match_radius: 50,
            error_threshold: 3,
            orb: OrbConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: u32,
    pub edge_threshold: u32,
    pub patch_size: u32,
    pub fast_threshold: u8,
}

impl Default for OrbConfig {
    fn default() -> Self {
        let params = OrbParams::default();
        Self {
            n_features: params.n_features,
            scale_factor: params.scale_factor,
            n_levels: params.n_levels,
            edge_threshold: params.edge_threshold,
            patch_size: params.patch_size,
            fast_threshold: params.fast_threshold,
        }
    }
}

impl From<&OrbConfig> for OrbParams {
    fn from(cfg: &OrbConfig) -> Self {
        OrbParams {
            n_features: cfg.n_features,
            scale_factor: cfg.scale_factor,
            n_levels: cfg.n_levels,
            edge_threshold: cfg.edge_threshold,
            patch_size: cfg.patch_size,
            fast_threshold: cfg.fast_threshold,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        storage::writable_format(&self.extension)?;
        if self.orb.n_features == 0 {
            anyhow::bail!("orb.n_features must be positive");
        }
        if !(self.orb.scale_factor > 1.0) {
            anyhow::bail!("orb.scale_factor must be greater than 1, got {}", self.orb.scale_factor);
        }
        if !(1..=MAX_LEVELS).contains(&self.orb.n_levels) {
            anyhow::bail!(
                "orb.n_levels must be between 1 and {}, got {}",
                MAX_LEVELS,
                self.orb.n_levels
            );
        }
        if !(5..=MAX_PATCH_SIZE).contains(&self.orb.patch_size) {
            anyhow::bail!(
                "orb.patch_size must be between 5 and {}, got {}",
                MAX_PATCH_SIZE,
                self.orb.patch_size
            );
        }
        if self.orb.edge_threshold > MAX_PATCH_SIZE {
            anyhow::bail!(
                "orb.edge_threshold must be at most {}, got {}",
                MAX_PATCH_SIZE,
                self.orb.edge_threshold
            );
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.match_radius, 50);
        assert_eq!(cfg.error_threshold, 3);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            gallery_dir: PathBuf::from("/srv/faces"),
            error_threshold: 8,
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "error_threshold = 10\n[orb]\nn_features = 200\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.error_threshold, 10);
        assert_eq!(cfg.orb.n_features, 200);
        assert_eq!(cfg.orb.n_levels, 8);
        assert_eq!(cfg.extension, "png");
    }

    #[test]
    fn test_rejects_bad_values() {
        let cfg = Config {
            extension: "txt".to_string(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.orb.scale_factor = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.orb.n_levels = 4_000_000_000;
        assert!(cfg.validate().is_err());
        cfg.orb.n_levels = MAX_LEVELS;
        assert!(cfg.validate().is_ok());

        let mut cfg = Config::default();
        cfg.orb.edge_threshold = MAX_PATCH_SIZE + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.orb.patch_size = 4096;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_extension_check_matches_gallery() {
        for ext in ["png", "PNG", ".bmp", "jpg", "jpeg"] {
            let cfg = Config {
                extension: ext.to_string(),
                ..Config::default()
            };
            assert!(cfg.validate().is_ok(), "{} rejected", ext);
            assert!(crate::DirectoryGallery::from_config(&cfg).is_ok());
        }
    }

    #[test]
    fn test_huge_level_count_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[orb]\nn_levels = 4000000000\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
