use crate::builder::{Builder, BuilderError};

use super::assert_not_none;

/// Identity and shape of the guest as handed to the provisioning tool
#[derive(Debug, Clone)]
pub struct Domain {
    /// libvirt domain name, also names the emitted definition file
    pub name: String,
    /// Guest memory in MiB
    pub memory_mib: u64,
    pub vcpus: u32,
    /// osinfo identifier passed through to `--os-variant`, e.g. `rhel9.4`
    pub os_variant: String,
}

#[derive(Debug)]
pub struct DomainBuilder {
    pub name: Option<String>,
    pub memory_mib: Option<u64>,
    pub vcpus: Option<u32>,
    pub os_variant: Option<String>,
}

impl Default for DomainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainBuilder {
    pub fn new() -> DomainBuilder {
        DomainBuilder {
            name: None,
            memory_mib: None,
            vcpus: None,
            os_variant: None,
        }
    }

    pub fn with_name(mut self, name: String) -> DomainBuilder {
        self.name = Some(name);
        self
    }

    pub fn with_memory_mib(mut self, memory_mib: u64) -> DomainBuilder {
        self.memory_mib = Some(memory_mib);
        self
    }

    pub fn with_vcpus(mut self, vcpus: u32) -> DomainBuilder {
        self.vcpus = Some(vcpus);
        self
    }

    pub fn with_os_variant(mut self, os_variant: String) -> DomainBuilder {
        self.os_variant = Some(os_variant);
        self
    }
}

impl Builder<Domain> for DomainBuilder {
    fn try_build(self) -> Result<Domain, BuilderError> {
        assert_not_none(stringify!(self.name), &self.name)?;
        assert_not_none(stringify!(self.memory_mib), &self.memory_mib)?;
        assert_not_none(stringify!(self.vcpus), &self.vcpus)?;
        assert_not_none(stringify!(self.os_variant), &self.os_variant)?;
        let name = self.name.unwrap();
        if name.is_empty() {
            return Err(BuilderError::InvalidFieldValue(
                "vm name cannot be empty".to_string(),
            ));
        }
        if self.memory_mib == Some(0) {
            return Err(BuilderError::InvalidFieldValue(
                "memory must be at least 1 MiB".to_string(),
            ));
        }
        if self.vcpus == Some(0) {
            return Err(BuilderError::InvalidFieldValue(
                "vcpus must be at least 1".to_string(),
            ));
        }
        Ok(Domain {
            name,
            memory_mib: self.memory_mib.unwrap(),
            vcpus: self.vcpus.unwrap(),
            os_variant: self.os_variant.unwrap(),
        })
    }
}
