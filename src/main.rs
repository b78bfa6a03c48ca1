use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use virtseed::builder::executor::HostExecutorBuilder;
use virtseed::builder::Builder;
use virtseed::config;
use virtseed::lockfile::HostLock;
use virtseed::provisioner::{ProvisionError, Provisioner};

/// Provision a libvirt guest with custom OVMF firmware from a declarative
/// JSON configuration
#[derive(Debug, Parser)]
#[command(name = "virtseed", version, about)]
struct Cli {
    /// Path to the JSON provisioning configuration
    #[arg(long, default_value = "/etc/virtseed/config.json")]
    config: PathBuf,

    /// Prompt before installing packages or the firmware descriptor
    #[arg(long)]
    interactive: bool,

    /// Directory where the generated definition is written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Lock file guarding against concurrent provisioning runs
    #[arg(long, default_value = "/run/lock/virtseed.lock")]
    lock_file: PathBuf,
}

async fn run(cli: Cli) -> Result<(), ProvisionError> {
    let mut config = config::load(&cli.config)?;
    if cli.interactive {
        config = config.with_interactive(true);
    }
    let vm_name = config.domain.name.clone();

    // Single writer from here on; released when the guard drops
    let _lock = HostLock::acquire(&cli.lock_file)?;

    let executor = HostExecutorBuilder::auto()
        .map_err(ProvisionError::Builder)?
        .with_output_dir(cli.output_dir)
        .try_build()
        .map_err(ProvisionError::Builder)?;
    let config = config.with_executor(executor);

    let mut provisioner = Provisioner::new();
    let definition = provisioner.provision(config).await?;

    println!("VM definition written to {}", definition.display());
    println!();
    println!("To register and start the guest:");
    println!("  virsh define {}", definition.display());
    println!("  virsh start {}", vm_name);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
