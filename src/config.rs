use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use crate::upload::{ManagerConfig, ObjectLocation, Result, UploadError, UrlResolution};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn default_timeout() -> u64 {
    300
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UrlResolutionKind {
    /// 按 bucket 命名规则在本地拼接
    #[default]
    Local,
    /// 通过 `/confirm-upload` 取地址
    Confirm,
}

/// config.toml
///
/// ```toml
/// endpoint = "http://localhost:3000"
/// bucket = "my-media-bucket"
/// region = "eu-west-1"
/// url_resolution = "local"
/// verify_uploads = false
/// max_concurrent = 4
/// request_timeout_secs = 300
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// 授权服务地址
    pub endpoint: String,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// 自定义公网前缀（CDN 等），优先于 bucket 规则
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub url_resolution: UrlResolutionKind,
    #[serde(default)]
    pub verify_uploads: bool,
    pub max_concurrent: Option<usize>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|err| UploadError::Config(format!("Can't read {}: {}", path.display(), err)))?;

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Config> {
        toml::from_str(config_str).map_err(|err| UploadError::Config(format!("Can't parse config: {}", err)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn manager_config(&self) -> Result<ManagerConfig> {
        let url_resolution = match self.url_resolution {
            UrlResolutionKind::Confirm => UrlResolution::Confirm,
            UrlResolutionKind::Local => {
                let mut location = match (&self.bucket, &self.public_base_url) {
                    (Some(bucket), _) => ObjectLocation::new(bucket.clone()),
                    (None, Some(_)) => ObjectLocation::new(String::new()),
                    (None, None) => {
                        return Err(UploadError::Config(
                            "`bucket` or `public_base_url` is required when url_resolution = \"local\"".to_string(),
                        ));
                    }
                };

                if let Some(region) = &self.region {
                    location = location.with_region(region.clone());
                }
                if let Some(base_url) = &self.public_base_url {
                    location = location.with_public_base_url(base_url.clone());
                }

                UrlResolution::Local(location)
            }
        };

        let mut config = ManagerConfig::new(url_resolution).with_verification(self.verify_uploads);
        match self.max_concurrent {
            Some(0) => return Err(UploadError::Config("`max_concurrent` must be at least 1".to_string())),
            Some(max_concurrent) => config = config.with_max_concurrent(max_concurrent),
            None => {}
        }

        Ok(config)
    }
}
