//! Symbol demangling through a pooled `llvm-cxxfilt` process

use log::warn;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use crate::domain::SymbolError;
use crate::process::{lock_pool, SharedPool, ToolCommand};
use crate::toolchain::Toolchain;

pub const DEMANGLER: &str = "llvm-cxxfilt";

/// Demangles names one line at a time.
///
/// Mangled names mean the same thing in every library, so the cache is flat.
pub struct Demangler {
    pool: SharedPool,
    tool: Option<PathBuf>,
    cache: HashMap<String, String>,
}

impl Demangler {
    #[must_use]
    pub fn new(pool: SharedPool) -> Self {
        Self { pool, tool: None, cache: HashMap::new() }
    }

    /// Demangle one symbol name.
    ///
    /// # Errors
    /// - [`SymbolError::DemanglerNotFound`] or [`SymbolError::ToolchainNotFound`]
    ///   if the tool cannot be located (fatal)
    /// - [`SymbolError::SpawnFailed`] or [`SymbolError::ToolIo`] if talking to it fails
    pub fn demangle(
        &mut self,
        toolchain: &Toolchain,
        mangled: &str,
    ) -> Result<String, SymbolError> {
        if let Some(hit) = self.cache.get(mangled) {
            return Ok(hit.clone());
        }

        let command = ToolCommand::new(self.tool_path(toolchain)?);
        let mut pool = lock_pool(&self.pool);

        let channel = pool.acquire(&command)?;
        let reply = channel.write_line(mangled).and_then(|()| channel.read_line());
        let demangled = match reply {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => {
                pool.discard(&command);
                return Err(SymbolError::ToolIo {
                    tool: DEMANGLER.to_string(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "tool closed its output"),
                });
            }
            Err(source) => {
                warn!("{DEMANGLER} failed on {mangled}: {source}");
                pool.discard(&command);
                return Err(SymbolError::ToolIo { tool: DEMANGLER.to_string(), source });
            }
        };

        self.cache.insert(mangled.to_string(), demangled.clone());
        Ok(demangled)
    }

    fn tool_path(&mut self, toolchain: &Toolchain) -> Result<PathBuf, SymbolError> {
        if let Some(ref path) = self.tool {
            return Ok(path.clone());
        }

        let path = toolchain.tool_path(DEMANGLER)?;
        if !path.is_file() {
            return Err(SymbolError::DemanglerNotFound);
        }

        self.tool = Some(path.clone());
        Ok(path)
    }
}
