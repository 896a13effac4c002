//! Function+offset lookup by disassembling the address range with `llvm-objdump`.
//!
//! Unlike the symbolizer this tool is run once per batch: it prints a flat
//! listing of the whole `[start, stop)` range, which is scanned once with a
//! cursor over the sorted request addresses.
//!
//! Function lines look like:
//! ```text
//! 000177b0 <android::IBinder::~IBinder()+0x2c>:
//! ```
//! and instruction lines like:
//! ```text
//!    177b2:	b510      	push	{r4, lr}
//! ```

use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use super::cache::LibraryCache;
use super::library::Library;
use crate::domain::{Address, Arch, ObjectSymbol, SymbolError};
use crate::process::{ChildRegistry, ToolCommand, ToolProcess};
use crate::toolchain::Toolchain;

pub const DISASSEMBLER: &str = "llvm-objdump";

/// Added past the highest address so its whole instruction is disassembled
const STOP_MARGIN: u64 = 8;

fn function_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-f0-9]*) <(.*)>:$").expect("valid regex"))
}

// Greedy so `operator+(..)+0x2c` keeps its `+`
fn symbol_offset() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\+0x([a-f0-9]*)").expect("valid regex"))
}

fn instruction_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([ a-f0-9]*):").expect("valid regex"))
}

pub struct DisassemblyResolver {
    arch: Arch,
    io_timeout: Duration,
    children: ChildRegistry,
    cache: LibraryCache<ObjectSymbol>,
}

impl DisassemblyResolver {
    #[must_use]
    pub fn new(arch: Arch, io_timeout: Duration, children: ChildRegistry) -> Self {
        Self { arch, io_timeout, children, cache: LibraryCache::new() }
    }

    /// Resolve each address to its enclosing function and offset.
    ///
    /// Returns `Ok(None)` when the library has no symbols or the disassembler
    /// cannot be started. Addresses not found in the listing are left out.
    ///
    /// # Errors
    /// Only session-level failures, such as a missing toolchain.
    pub fn resolve(
        &mut self,
        toolchain: &Toolchain,
        library: &Library,
        addrs: &[Address],
    ) -> Result<Option<HashMap<String, ObjectSymbol>>, SymbolError> {
        let mut sorted = addrs.to_vec();
        sorted.sort();
        sorted.dedup();

        let (mut result, misses) = self.cache.split(library.name(), &sorted);
        let (Some(first), Some(last)) = (misses.first(), misses.last()) else {
            return Ok(Some(result));
        };

        let Some(symbols) = library.symbols() else {
            return Ok(None);
        };

        let start = self.arch.strip_pc(first.value());
        let stop = self.arch.strip_pc(last.value()).saturating_add(STOP_MARGIN);
        let tool = toolchain.tool_path(DISASSEMBLER)?;
        let command = disassembler_command(&tool, symbols, start, stop);

        let spawned = ToolProcess::spawn_listing(&command, self.io_timeout, &self.children);
        let mut process = match spawned {
            Ok(process) => process,
            Err(e) => {
                warn!("{e}");
                return Ok(None);
            }
        };

        let lines = std::iter::from_fn(|| match process.read_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Reading {DISASSEMBLER} output for {} failed: {e}", library.name());
                None
            }
        });
        let found = correlate(lines, &misses, &self.arch);

        // Usually stops before the listing ends
        if let Err(e) = process.terminate() {
            warn!("Failed to reap {DISASSEMBLER}: {e}");
        }

        for addr in &misses {
            if let Some(object) = found.get(addr.text()) {
                self.cache.insert(library.name(), addr, object.clone());
            }
        }
        result.extend(found);

        Ok(Some(result))
    }
}

fn disassembler_command(tool: &Path, symbols: &Path, start: u64, stop: u64) -> ToolCommand {
    ToolCommand::new(tool).args([
        "--section=.text".to_string(),
        "--demangle".to_string(),
        "--disassemble".to_string(),
        format!("--start-address={start}"),
        format!("--stop-address={stop}"),
        symbols.display().to_string(),
    ])
}

/// Function name and true start address from a function line.
///
/// When the disassembler labels a chunk as `symbol+0xN`, the function really
/// starts `N` bytes before the labelled address.
fn parse_function_line(line: &str) -> Option<(String, u64)> {
    let caps = function_line().captures(line)?;
    let mut start = u64::from_str_radix(&caps[1], 16).ok()?;
    let mut symbol = caps[2].to_string();

    if let Some(offset_caps) = symbol_offset().captures(&caps[2]) {
        symbol = offset_caps[1].to_string();
        if let Ok(offset) = u64::from_str_radix(&offset_caps[2], 16) {
            start = start.saturating_sub(offset);
        }
    }

    Some((symbol, start))
}

fn parse_instruction_line(line: &str) -> Option<u64> {
    let caps = instruction_line().captures(line)?;
    let digits = caps[1].trim();
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Match sorted request addresses against a disassembly listing.
///
/// Instruction addresses only move forward, so a request below the current
/// instruction can no longer match and is skipped. Requests that strip to the
/// same instruction all match it. Scanning stops once every request is
/// settled.
pub fn correlate<I>(lines: I, targets: &[Address], arch: &Arch) -> HashMap<String, ObjectSymbol>
where
    I: IntoIterator<Item = String>,
{
    let mut found = HashMap::new();
    let mut current: Option<(String, u64)> = None;
    let mut cursor = 0;

    if targets.is_empty() {
        return found;
    }

    for line in lines {
        if let Some(function) = parse_function_line(&line) {
            current = Some(function);
            continue;
        }

        let Some(addr) = parse_instruction_line(&line) else {
            continue;
        };

        while cursor < targets.len() && arch.strip_pc(targets[cursor].value()) < addr {
            debug!("No instruction starts at {}", targets[cursor]);
            cursor += 1;
        }

        while cursor < targets.len() && arch.strip_pc(targets[cursor].value()) == addr {
            if let Some((ref symbol, start)) = current {
                let offset = addr.saturating_sub(start);
                let object = ObjectSymbol { symbol: symbol.clone(), offset };
                found.insert(targets[cursor].text().to_string(), object);
            }
            cursor += 1;
        }

        if cursor >= targets.len() {
            break;
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
/out/symbols/system/lib/libbinder.so:\tfile format elf32-littlearm

Disassembly of section .text:

000177a0 <android::IBinder::IBinder()>:
   177a0:\tb510      \tpush\t{r4, lr}
   177a2:\t4604      \tmov\tr4, r0

000177b0 <android::IBinder::~IBinder()+0x2c>:
   177b0:\tb510      \tpush\t{r4, lr}
   177b2:\t4604      \tmov\tr4, r0
   177b4:\tf7ff      \tbl\t0x17700

000177c0 <operator+(int, int)+0x4>:
   177c0:\t4408      \tadd\tr0, r1
";

    fn listing() -> Vec<String> {
        LISTING.lines().map(str::to_string).collect()
    }

    fn addrs(texts: &[&str]) -> Vec<Address> {
        let mut parsed: Vec<Address> = texts.iter().map(|t| Address::parse(t).unwrap()).collect();
        parsed.sort();
        parsed
    }

    #[test]
    fn test_parse_function_line() {
        assert_eq!(
            parse_function_line("000177a0 <android::IBinder::IBinder()>:"),
            Some(("android::IBinder::IBinder()".to_string(), 0x177a0))
        );
        assert_eq!(
            parse_function_line("000177b0 <android::IBinder::~IBinder()+0x2c>:"),
            Some(("android::IBinder::~IBinder()".to_string(), 0x17784))
        );
        assert_eq!(
            parse_function_line("000177c0 <operator+(int, int)+0x4>:"),
            Some(("operator+(int, int)".to_string(), 0x177bc))
        );
        assert_eq!(parse_function_line("   177b2:\tb510"), None);
    }

    #[test]
    fn test_parse_instruction_line() {
        assert_eq!(parse_instruction_line("   177b2:\tb510      \tpush\t{r4, lr}"), Some(0x177b2));
        assert_eq!(parse_instruction_line("Disassembly of section .text:"), None);
        assert_eq!(parse_instruction_line("000177a0 <foo>:"), None);
        assert_eq!(parse_instruction_line(""), None);
    }

    #[test]
    fn test_correlate_offsets() {
        let targets = addrs(&["000177a0", "000177b2", "000177c0"]);
        let found = correlate(listing(), &targets, &Arch::Arm64);

        assert_eq!(found["000177a0"].to_string(), "android::IBinder::IBinder()");
        assert_eq!(found["000177b2"].to_string(), "android::IBinder::~IBinder()+46");
        assert_eq!(found["000177c0"].to_string(), "operator+(int, int)+4");
    }

    #[test]
    fn test_correlate_strips_thumb_bit() {
        let targets = addrs(&["000177b3", "000177b2"]);
        let found = correlate(listing(), &targets, &Arch::Arm);

        assert_eq!(found.len(), 2);
        assert_eq!(found["000177b3"], found["000177b2"]);
    }

    #[test]
    fn test_correlate_skips_unmatched_address() {
        // 0x177a1 is mid-instruction; the cursor must not get stuck on it
        let targets = addrs(&["000177a1", "000177b4"]);
        let found = correlate(listing(), &targets, &Arch::Arm64);

        assert!(!found.contains_key("000177a1"));
        assert_eq!(found["000177b4"].to_string(), "android::IBinder::~IBinder()+48");
    }

    #[test]
    fn test_correlate_stops_early() {
        let targets = addrs(&["000177a0"]);
        let mut consumed = 0;
        let lines = listing().into_iter().inspect(|_| consumed += 1);
        let found = correlate(lines, &targets, &Arch::Arm64);

        assert_eq!(found.len(), 1);
        assert!(consumed < listing().len());
    }

    #[test]
    fn test_command_line() {
        let tool = Path::new("/llvm/llvm-objdump");
        let cmd = disassembler_command(tool, Path::new("/out/libc.so"), 96_160, 96_184);
        assert_eq!(
            cmd.to_string(),
            "/llvm/llvm-objdump --section=.text --demangle --disassemble \
             --start-address=96160 --stop-address=96184 /out/libc.so"
        );
    }
}
