//! Finding the unstripped binary for a device library path

use log::warn;
use std::path::{Path, PathBuf};

/// A library named in a crash report, and where its symbols were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    name: String,
    symbols: Option<PathBuf>,
}

impl Library {
    /// Look for the library under the symbols mirror, then at its literal path.
    ///
    /// A path that exists but is a directory is treated as not found.
    #[must_use]
    pub fn locate(name: &str, symbols_dir: Option<&Path>) -> Self {
        let mirrored = symbols_dir.map(|dir| dir.join(name.trim_start_matches('/')));
        let candidate = mirrored
            .filter(|p| p.exists())
            .or_else(|| Some(PathBuf::from(name)).filter(|p| !name.is_empty() && p.exists()));

        let symbols = match candidate {
            Some(path) if path.is_dir() => {
                warn!("Symbols path for {name} is a directory: {}", path.display());
                None
            }
            Some(path) => Some(path),
            None => {
                warn!("No symbols found for {name}");
                None
            }
        };

        Self { name: name.to_string(), symbols }
    }

    /// Name as it appeared in the crash report; the cache partition key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binary to hand to the tools, if one was found.
    #[must_use]
    pub fn symbols(&self) -> Option<&Path> {
        self.symbols.as_deref()
    }
}
