//! # Host Package Presence
//!
//! Verifies that the management tooling the later steps shell out to is
//! actually installed. Queries and installs are delegated to the host
//! package tooling through the [PackageManager] trait; [Dnf] is the
//! production implementation.

use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Host packages the later provisioning steps rely on
pub const REQUIRED_PACKAGES: &[&str] = &["qemu-kvm", "libvirt", "virt-install"];

#[derive(thiserror::Error, Debug)]
pub enum PackageError {
    #[error("Could not query package {0}, reason: {1}")]
    Query(String, String),
    #[error("Package installation failed: {0}")]
    Install(String),
}

/// Seam to the host package tooling
pub trait PackageManager {
    /// Whether the package is installed on the host
    fn installed(&self, package: &str) -> Result<bool, PackageError>;
    /// Install the given packages; a failed install is fatal to the run
    fn install(&self, packages: &[String]) -> Result<(), PackageError>;
}

/// Return the subset of `packages` not installed on the host
pub fn missing<M: PackageManager>(
    manager: &M,
    packages: &[&str],
) -> Result<Vec<String>, PackageError> {
    let mut absent = Vec::new();
    for package in packages {
        if !manager.installed(package)? {
            absent.push(package.to_string());
        }
    }
    if absent.is_empty() {
        debug!("All required packages are installed");
    }
    Ok(absent)
}

/// Production implementation: `rpm -q` for queries, `dnf install -y` for
/// installs
#[derive(Debug)]
pub struct Dnf;

impl PackageManager for Dnf {
    fn installed(&self, package: &str) -> Result<bool, PackageError> {
        let status = Command::new("rpm")
            .args(["-q", package])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| PackageError::Query(package.to_string(), e.to_string()))?;
        Ok(status.success())
    }

    fn install(&self, packages: &[String]) -> Result<(), PackageError> {
        info!("Installing packages: {}", packages.join(" "));
        let output = Command::new("dnf")
            .arg("install")
            .arg("-y")
            .args(packages)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PackageError::Install(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(PackageError::Install(stderr));
        }
        Ok(())
    }
}
