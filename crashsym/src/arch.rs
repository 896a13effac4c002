//! Architecture detection from crash-log text.
//!
//! Address handling depends on the target CPU (32-bit ARM addresses carry a
//! Thumb bit), so the architecture has to be known before anything is
//! resolved. Crash logs rarely say it outright, so this module guesses.
//!
//! # Detection Strategy
//!
//! Lines are scanned in order and each one is classified on its own:
//!
//! 1. **`ABI: 'xxx'`** - authoritative, scanning stops
//! 2. **Native frame** (`#00 pc 000374e0 ...`) - 8 or 16 hex digits give
//!    the bitness, the toolchain hints give the CPU family, scanning stops
//! 3. **Sanitizer frame** (`#3 0xae1725b5 (...)`) - more than 8 digits is
//!    conclusively 64-bit; a short address might just be a small 64-bit one,
//!    so it only counts if nothing better turns up later
//!
//! If no line says anything the session cannot continue.

use log::info;
use regex::Regex;
use std::env;
use std::ops::ControlFlow;
use std::sync::OnceLock;

use crate::config::{ENV_TOOLCHAIN, ENV_TOOLCHAIN_2ND_ARCH};
use crate::domain::{Arch, SymbolError};

fn abi_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ABI: '(.*)'").expect("valid regex"))
}

fn trace_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#[0-9]+[ \t]+..[ \t]+([0-9a-f]{8}|[0-9a-f]{16})([ \t]+|$)")
            .expect("valid regex")
    })
}

fn sanitizer_trace_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#[0-9]+[ \t]+0x([0-9a-f]+)[ \t]+").expect("valid regex"))
}

fn toolchain_arch() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(aarch64|arm|mips|x86)/").expect("valid regex"))
}

/// Toolchain paths from the build environment.
///
/// They are only mined for a CPU family token such as `/mips/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainHints {
    pub toolchain: Option<String>,
    pub toolchain_2nd_arch: Option<String>,
}

impl ToolchainHints {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            toolchain: env::var(ENV_TOOLCHAIN).ok().filter(|s| !s.is_empty()),
            toolchain_2nd_arch: env::var(ENV_TOOLCHAIN_2ND_ARCH).ok().filter(|s| !s.is_empty()),
        }
    }

    /// Best 32-bit guess: secondary toolchain, then primary, then `arm`.
    #[must_use]
    pub fn arch_32(&self) -> Arch {
        abi_from_toolchain(self.toolchain_2nd_arch.as_deref(), false)
            .or_else(|| abi_from_toolchain(self.toolchain.as_deref(), false))
            .unwrap_or(Arch::Arm)
    }

    /// Best 64-bit guess: primary toolchain, then `arm64`.
    #[must_use]
    pub fn arch_64(&self) -> Arch {
        abi_from_toolchain(self.toolchain.as_deref(), true).unwrap_or(Arch::Arm64)
    }
}

fn abi_from_toolchain(toolchain: Option<&str>, is_64bit: bool) -> Option<Arch> {
    let caps = toolchain_arch().captures(toolchain?)?;
    let arch = match (&caps[1], is_64bit) {
        ("aarch64", true) => Arch::Arm64,
        ("aarch64" | "arm", false) => Arch::Arm,
        ("x86", true) => Arch::X86_64,
        ("x86", false) => Arch::X86,
        ("mips", true) => Arch::Mips64,
        ("mips", false) => Arch::Mips,
        // 64-bit arm toolchains are always spelled aarch64
        ("arm", true) => Arch::Arm,
        _ => return None,
    };
    Some(arch)
}

/// What a single log line says about the architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSignal {
    /// Nothing recognizable on this line
    Undetermined,
    /// A guess that a later line may override
    Provisional(Arch),
    /// Settled; stop scanning
    Conclusive(Arch),
}

/// Classify one crash-log line.
#[must_use]
pub fn classify_line(line: &str, hints: &ToolchainHints) -> LineSignal {
    if let Some(caps) = abi_line().captures(line) {
        return LineSignal::Conclusive(Arch::from(&caps[1]));
    }

    if let Some(caps) = trace_line().captures(line) {
        let arch = if caps[1].len() == 16 { hints.arch_64() } else { hints.arch_32() };
        return LineSignal::Conclusive(arch);
    }

    if let Some(caps) = sanitizer_trace_line().captures(line) {
        return if caps[1].len() > 8 {
            LineSignal::Conclusive(hints.arch_64())
        } else {
            LineSignal::Provisional(hints.arch_32())
        };
    }

    LineSignal::Undetermined
}

/// Determine the architecture of a crash log.
///
/// # Errors
/// Returns [`SymbolError::ArchUndetermined`] if no line gives a signal.
pub fn detect_arch<I, S>(lines: I, hints: &ToolchainHints) -> Result<Arch, SymbolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let outcome = lines.into_iter().try_fold(None, |provisional, line| {
        match classify_line(line.as_ref(), hints) {
            LineSignal::Conclusive(arch) => ControlFlow::Break(arch),
            LineSignal::Provisional(arch) => ControlFlow::Continue(Some(arch)),
            LineSignal::Undetermined => ControlFlow::Continue(provisional),
        }
    });

    let arch = match outcome {
        ControlFlow::Break(arch) | ControlFlow::Continue(Some(arch)) => arch,
        ControlFlow::Continue(None) => return Err(SymbolError::ArchUndetermined),
    };

    info!("Detected architecture: {arch}");
    Ok(arch)
}
