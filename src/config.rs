//! Node configuration.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::detection::{DetectorConfig, VerificationConfig};

fn default_comms_period_ms() -> u64 {
    1000
}

fn default_verification_period_ms() -> u64 {
    1000
}

/// Full configuration of one detection node. All fields without a serde
/// default are required.
#[derive(Debug, Clone, Deserialize)]
pub struct LcdConfig {
    /// This robot's id, in [0, num_robots).
    pub robot_id: u16,
    /// Total number of robots in the deployment.
    pub num_robots: u16,
    /// Path to the visual vocabulary (DBoW2 text format).
    pub vocabulary_path: PathBuf,

    // Place recognition
    pub alpha: f64,
    pub dist_local: u32,
    pub max_db_results: usize,
    pub base_nss_factor: f64,
    pub min_nss_factor: f64,

    // Geometric verification
    pub lowe_ratio: f64,
    pub max_ransac_iterations: usize,
    pub ransac_threshold: f64,
    pub geometric_verification_min_inlier_count: usize,
    pub geometric_verification_min_inlier_percentage: f64,

    /// Maximum number of frame ids per outbound request.
    pub vlc_batch_size: usize,
    /// Directory for the loop-closure and comm-stats debug logs.
    pub log_output_path: PathBuf,

    /// Comms worker tick period.
    #[serde(default = "default_comms_period_ms")]
    pub comms_period_ms: u64,
    /// Verification worker tick period.
    #[serde(default = "default_verification_period_ms")]
    pub verification_period_ms: u64,
}

impl LcdConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let config: LcdConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Bounds-check every parameter.
    pub fn validate(&self) -> Result<()> {
        if self.num_robots == 0 {
            bail!("num_robots must be positive");
        }
        if self.robot_id >= self.num_robots {
            bail!(
                "robot_id {} outside fleet of {}",
                self.robot_id,
                self.num_robots
            );
        }
        if self.alpha <= 0.0 {
            bail!("alpha must be positive");
        }
        if self.max_db_results == 0 {
            bail!("max_db_results must be positive");
        }
        if self.base_nss_factor <= 0.0 {
            bail!("base_nss_factor must be positive");
        }
        if !(0.0..=1.0).contains(&self.lowe_ratio) || self.lowe_ratio == 0.0 {
            bail!("lowe_ratio must be in (0, 1]");
        }
        if self.max_ransac_iterations == 0 {
            bail!("max_ransac_iterations must be positive");
        }
        if self.ransac_threshold <= 0.0 {
            bail!("ransac_threshold must be positive");
        }
        if !(0.0..=1.0).contains(&self.geometric_verification_min_inlier_percentage) {
            bail!("geometric_verification_min_inlier_percentage must be in [0, 1]");
        }
        if self.vlc_batch_size == 0 {
            bail!("vlc_batch_size must be positive");
        }
        if self.comms_period_ms == 0 || self.verification_period_ms == 0 {
            bail!("worker periods must be positive");
        }
        Ok(())
    }

    /// Log every configured parameter.
    pub fn log_parameters(&self) {
        info!(
            "Loop closure detection node initialized (ID = {}).\n\
             Parameters:\n\
             num_robots = {}\n\
             alpha = {}\n\
             dist_local = {}\n\
             max_db_results = {}\n\
             base_nss_factor = {}\n\
             min_nss_factor = {}\n\
             lowe_ratio = {}\n\
             max_ransac_iterations = {}\n\
             ransac_threshold = {}\n\
             geometric_verification_min_inlier_count = {}\n\
             geometric_verification_min_inlier_percentage = {}\n\
             vlc_batch_size = {}",
            self.robot_id,
            self.num_robots,
            self.alpha,
            self.dist_local,
            self.max_db_results,
            self.base_nss_factor,
            self.min_nss_factor,
            self.lowe_ratio,
            self.max_ransac_iterations,
            self.ransac_threshold,
            self.geometric_verification_min_inlier_count,
            self.geometric_verification_min_inlier_percentage,
            self.vlc_batch_size
        );
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            self_id: self.robot_id,
            num_robots: self.num_robots,
            alpha: self.alpha,
            dist_local: self.dist_local,
            max_db_results: self.max_db_results,
            base_nss_factor: self.base_nss_factor,
            min_nss_factor: self.min_nss_factor,
        }
    }

    pub fn verification_config(&self) -> VerificationConfig {
        VerificationConfig {
            lowe_ratio: self.lowe_ratio,
            max_ransac_iterations: self.max_ransac_iterations,
            ransac_threshold: self.ransac_threshold,
            min_inlier_count: self.geometric_verification_min_inlier_count,
            min_inlier_percentage: self.geometric_verification_min_inlier_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn base_config() -> LcdConfig {
        LcdConfig {
            robot_id: 0,
            num_robots: 2,
            vocabulary_path: PathBuf::from("vocab.txt"),
            alpha: 0.5,
            dist_local: 5,
            max_db_results: 5,
            base_nss_factor: 0.2,
            min_nss_factor: 0.05,
            lowe_ratio: 0.8,
            max_ransac_iterations: 500,
            ransac_threshold: 0.05,
            geometric_verification_min_inlier_count: 10,
            geometric_verification_min_inlier_percentage: 0.3,
            vlc_batch_size: 10,
            log_output_path: PathBuf::from("/tmp"),
            comms_period_ms: 1000,
            verification_period_ms: 1000,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_robot_id_out_of_range() {
        let config = LcdConfig {
            robot_id: 2,
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_inlier_percentage() {
        let config = LcdConfig {
            geometric_verification_min_inlier_percentage: 1.5,
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let config = LcdConfig {
            vlc_batch_size: 0,
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "robot_id: 1\n\
             num_robots: 3\n\
             vocabulary_path: /data/vocab.txt\n\
             alpha: 0.1\n\
             dist_local: 20\n\
             max_db_results: 10\n\
             base_nss_factor: 0.05\n\
             min_nss_factor: 0.05\n\
             lowe_ratio: 0.7\n\
             max_ransac_iterations: 1000\n\
             ransac_threshold: 0.02\n\
             geometric_verification_min_inlier_count: 15\n\
             geometric_verification_min_inlier_percentage: 0.4\n\
             vlc_batch_size: 25\n\
             log_output_path: /tmp/lcd\n"
        )
        .unwrap();

        let config = LcdConfig::load_from_yaml(file.path()).unwrap();
        assert_eq!(config.robot_id, 1);
        assert_eq!(config.num_robots, 3);
        assert_eq!(config.vlc_batch_size, 25);
        // Defaults applied for the tick periods.
        assert_eq!(config.comms_period_ms, 1000);
        assert_eq!(config.verification_period_ms, 1000);
    }
}
