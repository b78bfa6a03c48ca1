use std::path::PathBuf;

use url::Url;

use crate::builder::{Builder, BuilderError};

use super::assert_not_none;

/// Default directory scanned by the firmware-autoselection mechanism for
/// operator-provided descriptors
pub const DEFAULT_DESCRIPTOR_DIR: &str = "/etc/qemu/firmware";

/// Local and remote locations of the OVMF images used by the guest
#[derive(Debug, Clone)]
pub struct Firmware {
    /// Local directory receiving the OVMF images
    pub dir: PathBuf,
    /// Filename of the OVMF code image inside [`Firmware::dir`]
    pub code: String,
    /// Filename of the OVMF variables template inside [`Firmware::dir`]
    pub vars: String,
    pub code_url: Url,
    pub vars_url: Url,
    /// Directory where the firmware descriptor is installed
    pub descriptor_dir: PathBuf,
}

impl Firmware {
    pub fn code_path(&self) -> PathBuf {
        self.dir.join(&self.code)
    }

    pub fn vars_path(&self) -> PathBuf {
        self.dir.join(&self.vars)
    }
}

#[derive(Debug)]
pub struct FirmwareBuilder {
    pub dir: Option<PathBuf>,
    pub base_url: Option<Url>,
    pub code: Option<String>,
    pub vars: Option<String>,
    pub descriptor_dir: Option<PathBuf>,
}

impl Default for FirmwareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareBuilder {
    pub fn new() -> FirmwareBuilder {
        FirmwareBuilder {
            dir: None,
            base_url: None,
            code: None,
            vars: None,
            descriptor_dir: None,
        }
    }

    pub fn with_dir(mut self, dir: PathBuf) -> FirmwareBuilder {
        self.dir = Some(dir);
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> FirmwareBuilder {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_code(mut self, code: String) -> FirmwareBuilder {
        self.code = Some(code);
        self
    }

    pub fn with_vars(mut self, vars: String) -> FirmwareBuilder {
        self.vars = Some(vars);
        self
    }

    pub fn with_descriptor_dir(mut self, descriptor_dir: PathBuf) -> FirmwareBuilder {
        self.descriptor_dir = Some(descriptor_dir);
        self
    }

    fn join(base: &Url, filename: &str) -> Result<Url, BuilderError> {
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), filename);
        Url::parse(&joined)
            .map_err(|e| BuilderError::InvalidFieldValue(format!("{}: {}", joined, e)))
    }
}

impl Builder<Firmware> for FirmwareBuilder {
    fn try_build(self) -> Result<Firmware, BuilderError> {
        assert_not_none(stringify!(self.dir), &self.dir)?;
        assert_not_none(stringify!(self.base_url), &self.base_url)?;
        assert_not_none(stringify!(self.code), &self.code)?;
        assert_not_none(stringify!(self.vars), &self.vars)?;
        let base_url = self.base_url.unwrap();
        let code = self.code.unwrap();
        let vars = self.vars.unwrap();
        let code_url = Self::join(&base_url, &code)?;
        let vars_url = Self::join(&base_url, &vars)?;
        Ok(Firmware {
            dir: self.dir.unwrap(),
            code,
            vars,
            code_url,
            vars_url,
            descriptor_dir: self
                .descriptor_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESCRIPTOR_DIR)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use url::Url;

    use crate::builder::firmware::{FirmwareBuilder, DEFAULT_DESCRIPTOR_DIR};
    use crate::builder::Builder;

    fn builder() -> FirmwareBuilder {
        FirmwareBuilder::new()
            .with_dir(PathBuf::from("/var/lib/virtseed/firmware"))
            .with_base_url(Url::parse("https://images.example.com/ovmf/").unwrap())
            .with_code("OVMF_CODE.secboot.fd".to_string())
            .with_vars("OVMF_VARS.secboot.fd".to_string())
    }

    #[test]
    fn full_firmware() {
        let firmware = builder().try_build().unwrap();
        assert_eq!(
            firmware.code_url.as_str(),
            "https://images.example.com/ovmf/OVMF_CODE.secboot.fd"
        );
        assert_eq!(
            firmware.vars_url.as_str(),
            "https://images.example.com/ovmf/OVMF_VARS.secboot.fd"
        );
        assert_eq!(
            firmware.code_path(),
            PathBuf::from("/var/lib/virtseed/firmware/OVMF_CODE.secboot.fd")
        );
        assert_eq!(
            firmware.descriptor_dir,
            PathBuf::from(DEFAULT_DESCRIPTOR_DIR)
        );
    }

    #[test]
    fn descriptor_dir_override() {
        let firmware = builder()
            .with_descriptor_dir(PathBuf::from("/tmp/firmware.d"))
            .try_build()
            .unwrap();
        assert_eq!(firmware.descriptor_dir, PathBuf::from("/tmp/firmware.d"));
    }

    #[test]
    #[should_panic]
    fn partial_firmware() {
        FirmwareBuilder::new()
            .with_dir(PathBuf::from("/var/lib/virtseed/firmware"))
            .try_build()
            .unwrap();
    }
}
