//! # Firmware Descriptor Installation
//!
//! The hypervisor's firmware-autoselection mechanism discovers available
//! UEFI firmware through JSON metadata documents dropped into a well-known
//! directory. This module renders one such document against the configured
//! OVMF locations and installs it idempotently: a descriptor that is already
//! present is never rewritten, and the caller only sends the daemon reload
//! signal when the file was newly written.

use std::fs;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::builder::firmware::Firmware;

/// Filename the descriptor is installed under, inside
/// [`Firmware::descriptor_dir`]
pub const DESCRIPTOR_FILENAME: &str = "60-ovmf-virtseed.json";

#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    #[error("Could not install firmware descriptor at {0}, reason: {1}")]
    Io(PathBuf, String),
    #[error("Could not render firmware descriptor, reason: {0}")]
    Render(#[from] serde_json::Error),
}

/// What the installation step did. Only [DescriptorOutcome::Written] warrants
/// a daemon reload.
#[derive(Debug, PartialEq, Eq)]
pub enum DescriptorOutcome {
    Written,
    AlreadyPresent,
    Declined,
}

/// QEMU firmware metadata document, the shape the autoselection mechanism
/// expects
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    pub description: String,
    #[serde(rename = "interface-types")]
    pub interface_types: Vec<String>,
    pub mapping: FirmwareMapping,
    pub targets: Vec<FirmwareTarget>,
    pub features: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareMapping {
    pub device: String,
    pub executable: FirmwareFile,
    #[serde(rename = "nvram-template")]
    pub nvram_template: FirmwareFile,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareFile {
    pub filename: String,
    pub format: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareTarget {
    pub architecture: String,
    pub machines: Vec<String>,
}

impl FirmwareDescriptor {
    /// Render the descriptor against the configured firmware locations, so
    /// the registry entry and the fetched images can never disagree.
    pub fn render(firmware: &Firmware) -> FirmwareDescriptor {
        FirmwareDescriptor {
            description: "OVMF with Secure Boot and SMM".to_string(),
            interface_types: vec!["uefi".to_string()],
            mapping: FirmwareMapping {
                device: "flash".to_string(),
                executable: FirmwareFile {
                    filename: firmware.code_path().display().to_string(),
                    format: "raw".to_string(),
                },
                nvram_template: FirmwareFile {
                    filename: firmware.vars_path().display().to_string(),
                    format: "raw".to_string(),
                },
            },
            targets: vec![FirmwareTarget {
                architecture: "x86_64".to_string(),
                machines: vec!["pc-q35-*".to_string()],
            }],
            features: vec![
                "acpi-s3".to_string(),
                "secure-boot".to_string(),
                "verbose-dynamic".to_string(),
            ],
            tags: vec![],
        }
    }
}

/// Full path the descriptor is installed at for this configuration
pub fn descriptor_path(firmware: &Firmware) -> PathBuf {
    firmware.descriptor_dir.join(DESCRIPTOR_FILENAME)
}

/// Ensure the firmware descriptor exists on the host.
///
/// The `confirm` callback gates the install; it is only invoked when work
/// would actually happen, so non-interactive callers pass `|_| true`.
/// Declining is not an error: the run continues without the descriptor.
#[instrument(skip_all)]
pub fn install<F>(firmware: &Firmware, confirm: F) -> Result<DescriptorOutcome, DescriptorError>
where
    F: FnOnce(&str) -> bool,
{
    let path = descriptor_path(firmware);
    if path.is_file() {
        info!(
            "Firmware descriptor already present at {}, nothing to do",
            path.display()
        );
        return Ok(DescriptorOutcome::AlreadyPresent);
    }

    let question = format!("Install firmware descriptor at {}?", path.display());
    if !confirm(&question) {
        warn!("Firmware descriptor installation declined, continuing without it");
        return Ok(DescriptorOutcome::Declined);
    }

    fs::create_dir_all(&firmware.descriptor_dir)
        .map_err(|e| DescriptorError::Io(firmware.descriptor_dir.clone(), e.to_string()))?;
    let body = serde_json::to_string_pretty(&FirmwareDescriptor::render(firmware))?;
    fs::write(&path, body).map_err(|e| DescriptorError::Io(path.clone(), e.to_string()))?;
    info!("Firmware descriptor written to {}", path.display());
    Ok(DescriptorOutcome::Written)
}
