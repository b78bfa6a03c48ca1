//! # Provisioning Configuration Builder
//!
//! This module provides a builder pattern to assemble the provisioning
//! configuration of a guest. For each component, all fields are optional and
//! are validated once you run the [`Builder::try_build`] method. Once the
//! build is successful, the resulting objects are immutable and can be
//! handed to the [Provisioner](crate::provisioner::Provisioner).
//!
//! ## Example
//!
//! ```rust
//! use std::path::PathBuf;
//! use url::Url;
//! use virtseed::builder::{Builder, Configuration};
//! use virtseed::builder::{disk::DiskBuilder, domain::DomainBuilder, firmware::FirmwareBuilder};
//!
//! // Identity and shape of the guest
//! let domain = DomainBuilder::new()
//!     .with_name("dev-guest".to_string())
//!     .with_memory_mib(4096)
//!     .with_vcpus(4)
//!     .with_os_variant("rhel9.4".to_string())
//!     .try_build()
//!     .unwrap();
//! // Where the OVMF images live locally and where they come from
//! let firmware = FirmwareBuilder::new()
//!     .with_dir(PathBuf::from("/var/lib/virtseed/firmware"))
//!     .with_base_url(Url::parse("https://images.example.com/ovmf").unwrap())
//!     .with_code("OVMF_CODE.secboot.fd".to_string())
//!     .with_vars("OVMF_VARS.secboot.fd".to_string())
//!     .try_build()
//!     .unwrap();
//! // The qcow2 disk backing the guest
//! let disk = DiskBuilder::new()
//!     .with_url(Url::parse("https://images.example.com/guest.qcow2").unwrap())
//!     .with_path(PathBuf::from("/var/lib/libvirt/images/dev-guest.qcow2"))
//!     .try_build()
//!     .unwrap();
//! let config = Configuration::new(domain)
//!     .with_firmware(firmware)
//!     .with_disk(disk)
//!     .with_check_packages(true);
//! ```

use crate::builder::{disk::DiskImage, domain::Domain, firmware::Firmware};
use crate::executor::Executor;

pub mod disk;
pub mod domain;
pub mod executor;
pub mod firmware;

fn assert_not_none<T>(key: &str, value: &Option<T>) -> Result<(), BuilderError> {
    match value {
        Some(_) => Ok(()),
        None => Err(BuilderError::MissingRequiredField(key.to_string())),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// The field is required but was not provided in the builder object
    MissingRequiredField(String),
    /// The field was provided but its value cannot be used
    InvalidFieldValue(String),
    /// Happens when using auto methods to detect the virt-install binary
    BinaryNotFound(String),
}

/// Generic trait which all builder components must implement in order to be
/// part of [Configuration]
pub trait Builder<T> {
    /// Validate all the fields from the builder object and apply it to the
    /// final object
    ///
    /// ## Example
    ///
    /// ```rust
    /// use virtseed::builder::Builder;
    /// use virtseed::builder::domain::DomainBuilder;
    ///
    /// DomainBuilder::new()
    ///     .with_name("dev-guest".to_string())
    ///     .with_memory_mib(2048)
    ///     .with_vcpus(2)
    ///     .with_os_variant("rhel9.4".to_string())
    ///     .try_build()
    ///     .unwrap();
    /// ```
    fn try_build(self) -> Result<T, BuilderError>;
}

/// Configuration object which represents everything needed to provision one
/// guest, when using the [Builder] the final object is this one.
#[derive(Debug)]
pub struct Configuration {
    pub executor: Option<Executor>,
    pub firmware: Option<Firmware>,
    pub disk: Option<DiskImage>,
    /// Gates the host package presence step entirely
    pub check_packages: bool,
    /// When true, package and descriptor installation prompt for confirmation
    pub interactive: bool,

    pub domain: Domain,
}

impl Configuration {
    pub fn new(domain: Domain) -> Configuration {
        Configuration {
            executor: None,
            firmware: None,
            disk: None,
            check_packages: false,
            interactive: false,
            domain,
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Configuration {
        let executor = executor.with_vm_name(self.domain.name.clone());
        self.executor = Some(executor);
        self
    }

    pub fn with_firmware(mut self, firmware: Firmware) -> Configuration {
        self.firmware = Some(firmware);
        self
    }

    pub fn with_disk(mut self, disk: DiskImage) -> Configuration {
        self.disk = Some(disk);
        self
    }

    pub fn with_check_packages(mut self, check_packages: bool) -> Configuration {
        self.check_packages = check_packages;
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Configuration {
        self.interactive = interactive;
        self
    }
}
