//! # Delegated Command Execution
//!
//! The executor is the component that talks to the host: it spawns the
//! external provisioning tool (`virt-install`) to synthesize the VM
//! definition, and it delivers the reload signal to the hypervisor management
//! daemon after a firmware descriptor install.
//!
//! ## Design
//!
//! The executor never interprets what the delegates produce beyond capturing
//! stdout and checking the exit status: the definition document is opaque
//! output, written verbatim to `<vm_name>.xml`. There is no retry policy;
//! any delegate failure is fatal and reported with its stderr.
//!
//! ## Implementation
//!
//! Delegates are spawned through the [Execute] trait. [HostExecutor] is the
//! production implementation running the real binaries; its reload command
//! can be swapped out, which is what the test suite does.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::{Child, Command};
use tracing::{debug, error, info, instrument};

use crate::builder::{disk::DiskImage, domain::Domain, firmware::Firmware};

/// Interface to determine how delegate commands are spawned and where their
/// output lands
pub trait Execute {
    /// Directory where generated definition documents are written
    fn output_dir(&self) -> PathBuf;
    /// Spawn the provisioning tool with the given argument list
    fn spawn_virt_install(&self, args: &[String]) -> Result<Child, ExecuteError>;
    /// Spawn the command that makes the hypervisor daemon pick up a newly
    /// installed firmware descriptor
    fn spawn_firmware_reload(&self) -> Result<Child, ExecuteError>;
}

#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
    #[error("Could not create output directory, reason: {0}")]
    Workspace(String),
    #[error("Could not spawn delegate command, reason: {0}")]
    Spawn(String),
    #[error("Delegate command {program} failed: {stderr}")]
    DelegateFailed { program: String, stderr: String },
    #[error("The provisioning tool produced an empty definition")]
    EmptyDefinition,
    #[error("Could not write definition to {0}, reason: {1}")]
    Definition(PathBuf, String),
}

/// Derive the full `virt-install` argument list from the validated
/// configuration. One canonical device template is used: virtio qcow2 disk,
/// UEFI boot from the fetched OVMF images, VNC on loopback, virtio video,
/// pty console and an i6300esb watchdog.
pub fn definition_args(domain: &Domain, firmware: &Firmware, disk: &DiskImage) -> Vec<String> {
    vec![
        "--name".to_string(),
        domain.name.clone(),
        "--memory".to_string(),
        domain.memory_mib.to_string(),
        "--vcpus".to_string(),
        domain.vcpus.to_string(),
        "--os-variant".to_string(),
        domain.os_variant.clone(),
        "--import".to_string(),
        "--disk".to_string(),
        format!("path={},format=qcow2,bus=virtio", disk.path.display()),
        "--boot".to_string(),
        format!(
            "uefi,loader={},loader.readonly=yes,loader.type=pflash,nvram.template={}",
            firmware.code_path().display(),
            firmware.vars_path().display()
        ),
        "--graphics".to_string(),
        "vnc,listen=127.0.0.1".to_string(),
        "--video".to_string(),
        "virtio".to_string(),
        "--console".to_string(),
        "pty,target.type=virtio".to_string(),
        "--watchdog".to_string(),
        "i6300esb,action=reset".to_string(),
        "--noautoconsole".to_string(),
        "--print-xml".to_string(),
    ]
}

/// Drives the delegate commands for one guest. Holds where the definition is
/// written and which concrete executor spawns the processes.
#[derive(Debug)]
pub struct Executor {
    /// Optional executor, if none is provided, it will crash as no other
    /// executor is available
    host: Option<HostExecutor>,
    /// Name of the guest being provisioned, used to derive the definition
    /// filename. Two runs with the same name write to the same file.
    vm_name: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Create a new Executor with no implementation, and with name "default"
    pub fn new() -> Executor {
        Executor {
            host: None,
            vm_name: "default".to_string(),
        }
    }

    /// Create a new Executor spawning real host binaries
    pub fn new_with_host(host: HostExecutor) -> Executor {
        Executor {
            host: Some(host),
            vm_name: "default".to_string(),
        }
    }

    /// Mutate the executor to provision a differently named guest
    pub fn with_vm_name(self, vm_name: String) -> Executor {
        Executor { vm_name, ..self }
    }

    /// Return the configured executor, or panic if none is configured
    fn executor(&self) -> &dyn Execute {
        match &self.host {
            Some(host) => host,
            None => panic!("No executor found"),
        }
    }

    /// Full path of the definition document this run will produce
    pub fn definition_path(&self) -> PathBuf {
        self.executor()
            .output_dir()
            .join(format!("{}.xml", self.vm_name))
    }

    /// Create the directory receiving the definition document
    pub fn create_workspace(&self) -> Result<(), ExecuteError> {
        debug!(
            "Creating workspace at {}",
            self.executor().output_dir().display()
        );
        std::fs::create_dir_all(self.executor().output_dir())
            .map_err(|e| ExecuteError::Workspace(e.to_string()))?;
        Ok(())
    }

    async fn wait_delegate(program: &str, child: Child) -> Result<Vec<u8>, ExecuteError> {
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecuteError::Spawn(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Delegate {} failed: {}", program, stderr);
            return Err(ExecuteError::DelegateFailed {
                program: program.to_string(),
                stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Run the provisioning tool and capture the definition it prints to
    /// `<output_dir>/<vm_name>.xml`
    #[instrument(skip_all, fields(vm = %self.vm_name))]
    pub async fn emit_definition(&self, args: &[String]) -> Result<PathBuf, ExecuteError> {
        info!("Synthesizing the VM definition");
        let child = self.executor().spawn_virt_install(args)?;
        let stdout = Self::wait_delegate("virt-install", child).await?;
        if stdout.is_empty() {
            return Err(ExecuteError::EmptyDefinition);
        }
        let path = self.definition_path();
        std::fs::write(&path, &stdout)
            .map_err(|e| ExecuteError::Definition(path.clone(), e.to_string()))?;
        debug!("Definition written to {}", path.display());
        Ok(path)
    }

    /// Ask the hypervisor management daemon to re-read its firmware registry.
    /// Sent at most once per run, and only after the descriptor was newly
    /// written.
    #[instrument(skip(self), fields(vm = %self.vm_name))]
    pub async fn reload_firmware_registry(&self) -> Result<(), ExecuteError> {
        info!("Reloading the hypervisor firmware registry");
        let child = self.executor().spawn_firmware_reload()?;
        Self::wait_delegate("firmware reload", child).await?;
        Ok(())
    }
}

/// Production [Execute] implementation spawning the real host binaries
#[derive(Debug)]
pub struct HostExecutor {
    /// Directory where the generated definition document is written
    pub output_dir: PathBuf,
    /// Path to the virt-install binary
    pub virt_install: PathBuf,
    /// Program delivering the daemon reload, `systemctl` on a real host
    pub reload_program: String,
}

/// Unit invoked by the reload delegate
const DAEMON_UNIT: &str = "libvirtd.service";

impl HostExecutor {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<Child, ExecuteError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecuteError::Spawn(e.to_string()))?;
        Ok(child)
    }
}

impl Execute for HostExecutor {
    fn output_dir(&self) -> PathBuf {
        self.output_dir.clone()
    }

    fn spawn_virt_install(&self, args: &[String]) -> Result<Child, ExecuteError> {
        self.spawn(&self.virt_install, args)
    }

    fn spawn_firmware_reload(&self) -> Result<Child, ExecuteError> {
        self.spawn(
            Path::new(&self.reload_program),
            &[
                "try-reload-or-restart".to_string(),
                DAEMON_UNIT.to_string(),
            ],
        )
    }
}
