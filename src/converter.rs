use std::{ffi::OsStr, path::Path, time::Duration};

use serde_json::Value;

use crate::{
    error::{Error, Result},
    tool::ToolCommand,
};

pub const DEFAULT_CONVERTER: &str = "pandoc-citeproc";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a bibliography file into CSL JSON entries.
pub trait Converter {
    fn convert(&self, path: &Path) -> Result<Vec<Value>>;
}

impl<C: Converter + ?Sized> Converter for &C {
    fn convert(&self, path: &Path) -> Result<Vec<Value>> {
        (**self).convert(path)
    }
}

/// Runs `pandoc-citeproc -j <path>` and parses the JSON array it prints.
#[derive(Debug, Clone)]
pub struct CiteprocConverter {
    command: ToolCommand,
    timeout: Duration,
}

impl Default for CiteprocConverter {
    fn default() -> Self {
        Self::new(ToolCommand::new(DEFAULT_CONVERTER))
    }
}

impl CiteprocConverter {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

impl Converter for CiteprocConverter {
    fn convert(&self, path: &Path) -> Result<Vec<Value>> {
        let stdout = self
            .command
            .run(&[OsStr::new("-j"), path.as_os_str()], self.timeout)?;
        serde_json::from_slice(&stdout).map_err(|source| {
            Error::MalformedOutput {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}
