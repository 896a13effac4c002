//! Core value types shared by the resolvers

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::errors::SymbolError;

/// A code address as it appeared in the crash report.
///
/// The original text is kept verbatim because it is the key callers use to
/// look results up; the numeric value drives sorting and range computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    text: String,
    value: u64,
}

impl Address {
    /// Parse a hexadecimal address, with or without a `0x` prefix.
    ///
    /// # Errors
    /// Returns [`SymbolError::InvalidAddress`] if the text is not valid hex.
    pub fn parse(text: &str) -> Result<Self, SymbolError> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(SymbolError::InvalidAddress(text.to_string()));
        }

        let value = u64::from_str_radix(digits, 16)
            .map_err(|_| SymbolError::InvalidAddress(text.to_string()))?;

        Ok(Self { text: text.to_string(), value })
    }

    /// The address exactly as the caller supplied it.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value).then_with(|| self.text.cmp(&other.text))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Target CPU architecture of the crashed process.
///
/// The named variants are the ones the toolchain heuristics can produce.
/// An explicit `ABI: '...'` line may name anything, which lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm,
    Arm64,
    Mips,
    Mips64,
    X86,
    X86_64,
    Other(String),
}

impl Arch {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Other(name) => name,
        }
    }

    /// Clear architecture-specific mode bits from a program counter.
    ///
    /// On 32-bit ARM the low bit flags Thumb mode and is not part of the
    /// instruction address.
    #[must_use]
    pub fn strip_pc(&self, addr: u64) -> u64 {
        match self {
            Arch::Arm => addr & !1,
            _ => addr,
        }
    }
}

impl From<&str> for Arch {
    fn from(name: &str) -> Self {
        match name {
            "arm" => Arch::Arm,
            "arm64" => Arch::Arm64,
            "mips" => Arch::Mips,
            "mips64" => Arch::Mips64,
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            other => Arch::Other(other.to_string()),
        }
    }
}

impl FromStr for Arch {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Arch::from(s))
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame of a line-level lookup: function name and `file:line`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceFrame {
    pub symbol: Option<String>,
    pub location: Option<String>,
}

impl SourceFrame {
    #[must_use]
    pub fn new(symbol: impl Into<String>, location: impl Into<String>) -> Self {
        Self { symbol: Some(symbol.into()), location: Some(location.into()) }
    }

    /// Stand-in frame for an address whose lookup failed mid-exchange.
    #[must_use]
    pub fn degraded(library: &str, message: &str) -> Self {
        let name = library.strip_prefix('/').unwrap_or(library);
        Self { symbol: None, location: Some(format!("{name}  ***Error: {message}")) }
    }
}

/// Enclosing function of an instruction and the byte offset into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSymbol {
    pub symbol: String,
    pub offset: u64,
}

impl fmt::Display for ObjectSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.symbol)
        } else {
            write!(f, "{}+{}", self.symbol, self.offset)
        }
    }
}

/// Merged symbol information for one (possibly inlined) frame of an address.
///
/// A resolved address maps to a non-empty list of these, most deeply inlined
/// first. The last entry is the function the code physically lives in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SymbolRecord {
    pub source_symbol: Option<String>,
    pub source_location: Option<String>,
    pub object_symbol_with_offset: Option<String>,
}

impl SymbolRecord {
    /// Record for an address nothing is known about.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }
}
