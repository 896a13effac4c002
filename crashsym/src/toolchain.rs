//! Locating the LLVM tools and the unstripped-symbols repository.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::domain::SymbolError;

/// Toolchain location relative to the source tree root
const LLVM_BINUTILS_DIR: &str = "prebuilts/clang/host/linux-x86/llvm-binutils-stable";

/// Build-system helper that knows where unstripped binaries are written
const SOONG_UI: &str = "build/soong/soong_ui.bash";

/// Resolves tool names to executable paths.
///
/// Lookup order: a pinned directory if one was configured, otherwise `PATH`,
/// otherwise the prebuilt LLVM directory in the source tree. The prebuilt
/// directory is checked once and memoized.
#[derive(Debug)]
pub struct Toolchain {
    build_top: PathBuf,
    pinned_dir: Option<PathBuf>,
    prebuilt_dir: OnceLock<PathBuf>,
}

impl Toolchain {
    #[must_use]
    pub fn new(build_top: impl Into<PathBuf>, pinned_dir: Option<PathBuf>) -> Self {
        Self { build_top: build_top.into(), pinned_dir, prebuilt_dir: OnceLock::new() }
    }

    /// Return the path used to invoke `tool`.
    ///
    /// # Errors
    /// Returns [`SymbolError::ToolchainNotFound`] if the tool is not on `PATH`
    /// and the prebuilt toolchain directory does not exist.
    pub fn tool_path(&self, tool: &str) -> Result<PathBuf, SymbolError> {
        if let Some(ref dir) = self.pinned_dir {
            return Ok(dir.join(tool));
        }

        if let Ok(found) = which::which(tool) {
            debug!("Using {tool} from PATH: {}", found.display());
            return Ok(found);
        }

        Ok(self.prebuilt_dir()?.join(tool))
    }

    fn prebuilt_dir(&self) -> Result<&Path, SymbolError> {
        if let Some(dir) = self.prebuilt_dir.get() {
            return Ok(dir);
        }

        let dir = self.build_top.join(LLVM_BINUTILS_DIR);
        if !dir.is_dir() {
            return Err(SymbolError::ToolchainNotFound(dir));
        }

        info!("Using toolchain from: {}", dir.display());
        Ok(self.prebuilt_dir.get_or_init(|| dir))
    }
}

/// Ask the build system where unstripped binaries live.
///
/// Returns `None` when `build_top` is not a build tree or the query fails;
/// libraries are then looked up by their literal path only.
#[must_use]
pub fn find_symbols_dir(build_top: &Path) -> Option<PathBuf> {
    if !build_top.join(SOONG_UI).is_file() {
        debug!("No {SOONG_UI} under {}, skipping symbols lookup", build_top.display());
        return None;
    }

    let output = Command::new("/bin/bash")
        .arg(SOONG_UI)
        .args(["--dumpvar-mode", "--abs", "TARGET_OUT_UNSTRIPPED"])
        .current_dir(build_top)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let dir = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if dir.is_empty() {
                None
            } else {
                info!("Using symbols from: {dir}");
                Some(PathBuf::from(dir))
            }
        }
        Ok(out) => {
            warn!("{SOONG_UI} exited with {}", out.status);
            None
        }
        Err(e) => {
            warn!("Failed to run {SOONG_UI}: {e}");
            None
        }
    }
}
