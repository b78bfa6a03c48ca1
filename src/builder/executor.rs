use std::{
    env::{split_paths, var_os},
    path::PathBuf,
};

use crate::{
    builder::{Builder, BuilderError},
    executor::{Executor, HostExecutor},
};

use super::assert_not_none;

#[derive(Debug)]
pub struct HostExecutorBuilder {
    output_dir: Option<PathBuf>,
    virt_install: Option<PathBuf>,
    reload_program: Option<String>,
}

impl Default for HostExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostExecutorBuilder {
    pub fn new() -> HostExecutorBuilder {
        HostExecutorBuilder {
            output_dir: None,
            virt_install: None,
            reload_program: None,
        }
    }

    /// Tries to determine if `virt-install` binary exists in the `$PATH` variable, if it does, it
    /// will return the path to the binary.
    fn find_binary_from_path() -> Option<PathBuf> {
        var_os("PATH").and_then(|paths| {
            split_paths(&paths)
                .filter_map(|d| {
                    let full_path = d.join("virt-install");
                    if full_path.is_file() {
                        Some(full_path)
                    } else {
                        None
                    }
                })
                .next()
        })
    }

    /// Tries to determine if `virt-install` binary exists in the current working directory, if it
    /// does, it will return the path to the binary.
    fn find_binary_from_current_directory() -> Option<PathBuf> {
        let full_path = PathBuf::from("./virt-install");
        match full_path.is_file() {
            true => Some(full_path),
            false => None,
        }
    }

    /// Tries to determine if variable `VIRT_INSTALL_LOCATION` exists, if it does, it will check if
    /// the binary exists, if it does, it will return the content of the variable.
    fn find_binary_from_env_location() -> Option<PathBuf> {
        if let Some(path) = var_os("VIRT_INSTALL_LOCATION") {
            if PathBuf::from(&path).is_file() {
                return Some(PathBuf::from(path));
            }

            log::warn!(
                "VIRT_INSTALL_LOCATION is set but the file does not exist: {:?}",
                path
            );
        }
        None
    }

    /// Tries to determine the `virt-install` binary location.
    ///
    /// It is based on multiple sources (top to bottom priority).
    ///
    /// - `VIRT_INSTALL_LOCATION` environment variable: direct path to the binary
    /// - `$PATH` environment variable: search for the binary in the directories
    /// - `virt-install` binary in the current working directory
    pub fn determine_binary_location() -> Result<PathBuf, BuilderError> {
        Self::find_binary_from_env_location()
            .or_else(Self::find_binary_from_path)
            .or_else(Self::find_binary_from_current_directory)
            .ok_or_else(|| {
                BuilderError::BinaryNotFound(
                    "Check that virt-install is installed or that the VIRT_INSTALL_LOCATION \
                     environment variable is correctly set."
                        .to_string(),
                )
            })
    }

    /// Create a new host executor builder, trying to determine the binary
    /// location automatically (see [Self::determine_binary_location]).
    ///
    /// If you don't provide a directory for the generated definition, the
    /// current working directory is used.
    pub fn auto() -> Result<HostExecutorBuilder, BuilderError> {
        let binary_path = Self::determine_binary_location()?;

        let builder = Self::new()
            .with_output_dir(PathBuf::from("."))
            .with_virt_install(binary_path);

        Ok(builder)
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> HostExecutorBuilder {
        self.output_dir = Some(output_dir);
        self
    }

    pub fn with_virt_install(mut self, virt_install: PathBuf) -> HostExecutorBuilder {
        self.virt_install = Some(virt_install);
        self
    }

    /// Swap out the program delivering the daemon reload, `systemctl` by
    /// default
    pub fn with_reload_program(mut self, reload_program: String) -> HostExecutorBuilder {
        self.reload_program = Some(reload_program);
        self
    }
}

impl Builder<Executor> for HostExecutorBuilder {
    fn try_build(self) -> Result<Executor, BuilderError> {
        assert_not_none(stringify!(self.output_dir), &self.output_dir)?;
        assert_not_none(stringify!(self.virt_install), &self.virt_install)?;
        let host = HostExecutor {
            output_dir: self.output_dir.unwrap(),
            virt_install: self.virt_install.unwrap(),
            reload_program: self.reload_program.unwrap_or_else(|| "systemctl".to_string()),
        };
        Ok(Executor::new_with_host(host))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::fs::File;
    use std::path::PathBuf;

    use tempfile::tempdir;

    use crate::builder::executor::HostExecutorBuilder;
    use crate::builder::Builder;

    #[test]
    fn host_executor_builder() {
        HostExecutorBuilder::new()
            .with_output_dir(PathBuf::from("."))
            .with_virt_install(PathBuf::from("/usr/bin/virt-install"))
            .try_build()
            .unwrap();
    }

    #[test]
    fn host_executor_required_fields() {
        let result = HostExecutorBuilder::new()
            .with_output_dir(PathBuf::from("."))
            .try_build();
        assert!(result.is_err());

        let result = HostExecutorBuilder::new()
            .with_virt_install(PathBuf::from("/usr/bin/virt-install"))
            .try_build();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn can_determine_binary_location_from_env() {
        let dir = tempdir().expect("failed to create temporary directory");
        let file_path = dir.path().join("virt-install");
        let _file = File::create(file_path.clone()).expect("failed to create temporary file");
        std::env::set_var("VIRT_INSTALL_LOCATION", file_path);
        let result = HostExecutorBuilder::determine_binary_location();
        assert!(result.is_ok());
        std::env::remove_var("VIRT_INSTALL_LOCATION");
    }

    #[test]
    #[serial]
    fn cant_determine_binary_location_from_env() {
        std::env::set_var("VIRT_INSTALL_LOCATION", "/tmp/invalid_path/virt-install");
        let result = HostExecutorBuilder::find_binary_from_env_location();
        assert!(result.is_none());
        std::env::remove_var("VIRT_INSTALL_LOCATION");
    }

    #[test]
    #[serial]
    fn can_determine_binary_location_from_path() {
        let dir = tempdir().expect("failed to create temporary directory");
        let file_path = dir.path().join("virt-install");
        let _file = File::create(file_path.clone()).expect("failed to create temporary file");

        let original_path = std::env::var_os("PATH");
        std::env::set_var("PATH", file_path.parent().unwrap());
        let result = HostExecutorBuilder::determine_binary_location();
        match original_path {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }
        assert!(result.is_ok())
    }

    #[test]
    #[serial]
    fn cant_determine_binary_location_from_path() {
        let original_path = std::env::var_os("PATH");
        std::env::set_var("PATH", "/tmp/invalid_path");
        let result = HostExecutorBuilder::determine_binary_location();
        match original_path {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }
        assert!(result.is_err())
    }
}
