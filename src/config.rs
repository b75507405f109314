//! Service configuration
//!
//! Collects everything the server and the sweep need to know about their
//! environment: where media lives, which model files back the two engines,
//! and the operational limits.

use crate::error::{CutoutError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum accepted upload size (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Default retention age for uploaded and result files (1 hour)
pub const DEFAULT_RETENTION_MAX_AGE: Duration = Duration::from_secs(3600);

/// Configuration for the background removal service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Root directory holding the `uploads/` and `results/` subdirectories
    pub media_root: PathBuf,
    /// ONNX model file backing the primary (`withoutbg`) engine
    pub withoutbg_model: PathBuf,
    /// ONNX model file backing the fallback (`rembg`) engine
    pub rembg_model: PathBuf,
    /// Maximum accepted size of an uploaded request body in bytes
    pub max_upload_bytes: usize,
    /// Age after which stored files become eligible for the retention sweep
    pub retention_max_age: Duration,
}

impl ServiceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns a validation error for a zero upload cap or a zero retention
    /// age; model files are not checked here since they are only read on
    /// first engine use.
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(CutoutError::validation(
                "max_upload_bytes must be greater than zero",
            ));
        }
        if self.retention_max_age.is_zero() {
            return Err(CutoutError::validation(
                "retention_max_age must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            media_root: PathBuf::from("media"),
            withoutbg_model: PathBuf::from("models/withoutbg.onnx"),
            rembg_model: PathBuf::from("models/rembg.onnx"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention_max_age: DEFAULT_RETENTION_MAX_AGE,
        }
    }
}

/// Builder for [`ServiceConfig`]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.media_root = root.into();
        self
    }

    #[must_use]
    pub fn withoutbg_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.withoutbg_model = path.into();
        self
    }

    #[must_use]
    pub fn rembg_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rembg_model = path.into();
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn retention_max_age(mut self, age: Duration) -> Self {
        self.config.retention_max_age = age;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.media_root, PathBuf::from("media"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServiceConfig::builder()
            .media_root("/srv/cutout")
            .max_upload_bytes(1024)
            .retention_max_age(Duration::from_secs(600))
            .build()
            .unwrap();

        assert_eq!(config.media_root, PathBuf::from("/srv/cutout"));
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.retention_max_age, Duration::from_secs(600));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let result = ServiceConfig::builder().max_upload_bytes(0).build();
        assert!(result.is_err());

        let result = ServiceConfig::builder()
            .retention_max_age(Duration::ZERO)
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("retention_max_age"));
    }
}
