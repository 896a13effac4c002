//! Session configuration gathered from the environment and the command line

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::arch::ToolchainHints;

/// Root of the source tree the crashed build came from
pub const ENV_BUILD_TOP: &str = "ANDROID_BUILD_TOP";
/// Primary toolchain path, only used to guess the architecture
pub const ENV_TOOLCHAIN: &str = "ANDROID_TOOLCHAIN";
/// Secondary (32-bit) toolchain path, only used to guess the architecture
pub const ENV_TOOLCHAIN_2ND_ARCH: &str = "ANDROID_TOOLCHAIN_2ND_ARCH";

/// Maximum number of tool processes each pool keeps alive
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// How long to wait for a single line from a tool before giving up
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a [`Session`](crate::symbolization::Session) needs besides the architecture.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Source tree root; the fallback toolchain lives beneath it
    pub build_top: PathBuf,
    /// Directory mirroring device library paths with unstripped binaries.
    /// `None` means it is discovered from `build_top` on session start.
    pub symbols_dir: Option<PathBuf>,
    /// Pin every tool lookup to this directory instead of searching PATH
    pub toolchain_dir: Option<PathBuf>,
    pub hints: ToolchainHints,
    pub pool_capacity: usize,
    pub io_timeout: Duration,
}

impl SessionConfig {
    /// Build a configuration from `ANDROID_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let build_top =
            env::var_os(ENV_BUILD_TOP).map_or_else(|| PathBuf::from("."), PathBuf::from);

        Self {
            build_top,
            symbols_dir: None,
            toolchain_dir: None,
            hints: ToolchainHints::from_env(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            build_top: PathBuf::from("."),
            symbols_dir: None,
            toolchain_dir: None,
            hints: ToolchainHints::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.build_top, PathBuf::from("."));
        assert_eq!(config.pool_capacity, 10);
        assert_eq!(config.io_timeout, Duration::from_secs(30));
        assert!(config.symbols_dir.is_none());
        assert!(config.toolchain_dir.is_none());
    }
}
