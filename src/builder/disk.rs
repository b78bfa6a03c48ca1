use std::path::PathBuf;

use url::Url;

use crate::builder::{Builder, BuilderError};

use super::assert_not_none;

/// The qcow2 image backing the guest disk, keyed by where it comes from and
/// where it must land on the host
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub url: Url,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct DiskBuilder {
    pub url: Option<Url>,
    pub path: Option<PathBuf>,
}

impl Default for DiskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskBuilder {
    pub fn new() -> DiskBuilder {
        DiskBuilder {
            url: None,
            path: None,
        }
    }

    pub fn with_url(mut self, url: Url) -> DiskBuilder {
        self.url = Some(url);
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> DiskBuilder {
        self.path = Some(path);
        self
    }
}

impl Builder<DiskImage> for DiskBuilder {
    fn try_build(self) -> Result<DiskImage, BuilderError> {
        assert_not_none(stringify!(self.url), &self.url)?;
        assert_not_none(stringify!(self.path), &self.path)?;
        Ok(DiskImage {
            url: self.url.unwrap(),
            path: self.path.unwrap(),
        })
    }
}
