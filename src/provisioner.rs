//! # High-level provisioning flow (recommended)
//!
//! This module drives the whole procedure against a validated
//! [Configuration]: it hides the individual steps and brings the host into
//! the state required to define the guest as quickly as possible.
//!
//! ## Example
//!
//! ```ignore
//! use virtseed::builder::executor::HostExecutorBuilder;
//! use virtseed::builder::Builder;
//! use virtseed::provisioner::Provisioner;
//! let executor = HostExecutorBuilder::auto().unwrap().try_build().unwrap();
//! let config = virtseed::config::load("/etc/virtseed/config.json".as_ref())
//!     .unwrap()
//!     .with_executor(executor);
//!
//! let mut provisioner = Provisioner::new();
//! let definition = provisioner.provision(config).await.unwrap();
//! println!("Definition written to {}", definition.display());
//! ```
//!
//! Every step is idempotent: re-running after a successful run performs no
//! network transfer and no descriptor write, and simply re-emits the
//! definition document.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::{
    builder::Configuration,
    config::ConfigError,
    descriptor::{self, DescriptorError, DescriptorOutcome},
    executor::{definition_args, ExecuteError, Executor},
    fetch::{self, FetchError},
    lockfile::LockError,
    packages::{self, Dnf, PackageError, PackageManager},
};

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("No {0} was provided in the configuration")]
    MissingComponent(&'static str),
    #[error("Executor setup failed: {0:?}")]
    Builder(crate::builder::BuilderError),
    #[error("Could not prepare {0}, reason: {1}")]
    Setup(PathBuf, String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Packages(#[from] PackageError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Only an explicit yes proceeds; anything else declines
fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn confirm_on_stdin(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => parse_answer(&line),
        Err(_) => false,
    }
}

/// Verify the required packages are present, installing the missing subset.
/// Declining the confirmation is accepted: the run continues with a warning
/// and later steps may fail on the absent tooling.
fn ensure_packages<M, F>(manager: &M, confirm: F) -> Result<(), ProvisionError>
where
    M: PackageManager,
    F: FnOnce(&str) -> bool,
{
    let absent = packages::missing(manager, packages::REQUIRED_PACKAGES)?;
    if absent.is_empty() {
        return Ok(());
    }
    info!("Missing packages: {}", absent.join(" "));
    if !confirm(&format!("Install missing packages ({})?", absent.join(" "))) {
        warn!("Package installation declined, continuing; later steps may fail");
        return Ok(());
    }
    manager.install(&absent)?;
    Ok(())
}

/// Artifacts end up readable by owner and group only
fn normalize_mode(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o640))
        .map_err(|e| ProvisionError::Setup(path.to_path_buf(), e.to_string()))
}

fn prepare_dir(path: &Path) -> Result<(), ProvisionError> {
    std::fs::create_dir_all(path)
        .map_err(|e| ProvisionError::Setup(path.to_path_buf(), e.to_string()))
}

/// Brings a host into the state required to define one guest
#[derive(Debug)]
pub struct Provisioner {
    /// Executor running the delegate commands once artifacts are in place
    executor: Executor,
    /// One HTTP client reused across the artifact fetches
    http: reqwest::Client,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner {
    pub fn new() -> Self {
        Provisioner {
            executor: Executor::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Run the full linear procedure. Each step is idempotent and any
    /// failure is fatal; nothing is retried.
    ///
    /// 1. Verify the management tooling packages (gated by `check_packages`)
    /// 2. Install the firmware descriptor, reloading the daemon only if it
    ///    was newly written
    /// 3. Prepare the local directories receiving artifacts and output
    /// 4. Fetch the OVMF images and the disk image if absent
    /// 5. Normalize artifact permissions
    /// 6. Synthesize the VM definition and capture it to `<vm_name>.xml`
    #[instrument(skip_all, fields(vm = %config.domain.name))]
    pub async fn provision(&mut self, config: Configuration) -> Result<PathBuf, ProvisionError> {
        self.executor = match config.executor {
            Some(executor) => Ok(executor),
            None => Err(ProvisionError::MissingComponent("executor")),
        }?;
        let firmware = config
            .firmware
            .ok_or(ProvisionError::MissingComponent("firmware"))?;
        let disk = config
            .disk
            .ok_or(ProvisionError::MissingComponent("disk"))?;
        let interactive = config.interactive;
        let confirm = |question: &str| !interactive || confirm_on_stdin(question);

        // Step 1. Verify the management tooling is installed
        if config.check_packages {
            ensure_packages(&Dnf, confirm)?;
        } else {
            debug!("Package check disabled by configuration");
        }

        // Step 2. Install the firmware descriptor
        let outcome = descriptor::install(&firmware, confirm)?;
        if outcome == DescriptorOutcome::Written {
            self.executor.reload_firmware_registry().await?;
        }

        // Step 3. Prepare the local directories
        prepare_dir(&firmware.dir)?;
        if let Some(parent) = disk.path.parent() {
            prepare_dir(parent)?;
        }
        self.executor.create_workspace()?;

        // Step 4. Fetch the artifacts that are not already present
        fetch::ensure_fetched(&self.http, &firmware.code_url, &firmware.code_path()).await?;
        fetch::ensure_fetched(&self.http, &firmware.vars_url, &firmware.vars_path()).await?;
        fetch::ensure_fetched(&self.http, &disk.url, &disk.path).await?;

        // Step 5. Normalize artifact permissions
        for path in [firmware.code_path(), firmware.vars_path(), disk.path.clone()] {
            normalize_mode(&path)?;
        }

        // Step 6. Synthesize the VM definition
        let args = definition_args(&config.domain, &firmware, &disk);
        let definition = self.executor.emit_definition(&args).await?;
        info!("Guest definition available at {}", definition.display());
        Ok(definition)
    }
}
