//! # Configuration File Loading
//!
//! One JSON object, operator edited, loaded once at startup and immutable
//! afterwards. Every key is extracted individually so a missing or mistyped
//! field is reported by name, the way the operator wrote it, instead of as a
//! serde path. The validated values flow through the
//! [builder](crate::builder) module and come out as an immutable
//! [Configuration].

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use crate::builder::{
    disk::DiskBuilder, domain::DomainBuilder, firmware::FirmwareBuilder, Builder, BuilderError,
    Configuration,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),
    #[error("Could not read configuration file {0}, reason: {1}")]
    Read(PathBuf, String),
    #[error("Configuration is not a JSON object, reason: {0}")]
    Syntax(String),
    #[error("Configuration field {0} is missing or has the wrong type")]
    Field(String),
    #[error("Configuration field {0} is not a valid URL: {1}")]
    Url(String, String),
    #[error("Configuration value rejected: {0:?}")]
    Invalid(BuilderError),
}

impl From<BuilderError> for ConfigError {
    fn from(e: BuilderError) -> ConfigError {
        ConfigError::Invalid(e)
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Result<String, ConfigError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Field(key.to_string()))
}

fn int_field(obj: &Map<String, Value>, key: &str) -> Result<u64, ConfigError> {
    obj.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| ConfigError::Field(key.to_string()))
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Result<bool, ConfigError> {
    obj.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| ConfigError::Field(key.to_string()))
}

fn optional_bool(obj: &Map<String, Value>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match obj.get(key) {
        None => Ok(default),
        Some(_) => bool_field(obj, key),
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, ConfigError> {
    match obj.get(key) {
        None => Ok(None),
        Some(_) => str_field(obj, key).map(Some),
    }
}

fn url_field(obj: &Map<String, Value>, key: &str) -> Result<Url, ConfigError> {
    let raw = str_field(obj, key)?;
    Url::parse(&raw).map_err(|e| ConfigError::Url(key.to_string(), e.to_string()))
}

/// Warn when the operator-edited configuration can be tampered with by other
/// users on the host.
fn warn_loose_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o022 != 0 {
            warn!(
                "Configuration file {} is writable by group or other (mode {:o})",
                path.display(),
                mode & 0o777
            );
        }
    }
}

/// Load and validate the provisioning configuration.
///
/// Fails with [ConfigError::NotFound] before touching anything else on the
/// host if the file is absent.
pub fn load(path: &Path) -> Result<Configuration, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    warn_loose_permissions(path);

    let contents =
        fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Syntax(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ConfigError::Syntax("top level is not an object".to_string()))?;

    let vcpus = u32::try_from(int_field(obj, "cpus")?)
        .map_err(|_| ConfigError::Field("cpus".to_string()))?;
    let domain = DomainBuilder::new()
        .with_name(str_field(obj, "vm_name")?)
        .with_memory_mib(int_field(obj, "memory")?)
        .with_vcpus(vcpus)
        .with_os_variant(str_field(obj, "os_variant")?)
        .try_build()?;

    let mut firmware = FirmwareBuilder::new()
        .with_dir(PathBuf::from(str_field(obj, "firmware_dir")?))
        .with_base_url(url_field(obj, "ovmf_base_url")?)
        .with_code(str_field(obj, "ovmf_code")?)
        .with_vars(str_field(obj, "ovmf_vars")?);
    if let Some(dir) = optional_str(obj, "firmware_descriptor_dir")? {
        firmware = firmware.with_descriptor_dir(PathBuf::from(dir));
    }
    let firmware = firmware.try_build()?;

    let disk = DiskBuilder::new()
        .with_url(url_field(obj, "qcow2_image_url")?)
        .with_path(PathBuf::from(str_field(obj, "qcow2_image_path")?))
        .try_build()?;

    let config = Configuration::new(domain)
        .with_firmware(firmware)
        .with_disk(disk)
        .with_check_packages(bool_field(obj, "check_packages")?)
        .with_interactive(optional_bool(obj, "interactive", false)?);

    info!(
        "Loaded configuration for guest {} from {}",
        config.domain.name,
        path.display()
    );
    Ok(config)
}
