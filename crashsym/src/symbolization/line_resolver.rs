//! Source line lookup through a persistent `llvm-symbolizer` process.
//!
//! One symbolizer process is kept per library (the binary is fixed when the
//! process starts) and fed one address at a time. With `--output-style=GNU`
//! the tool prints a `symbol` / `file:line` pair per inlined frame and no
//! terminator, so after the first pair arrives a blank request is written:
//! the tool echoes it as a blank line once the remaining frames are out.

use log::warn;
use std::collections::HashMap;
use std::io;
use std::path::Path;

use super::cache::LibraryCache;
use super::library::Library;
use crate::domain::{Address, SourceFrame, SymbolError};
use crate::process::{lock_pool, SharedPool, ToolCommand, ToolProcess};
use crate::toolchain::Toolchain;

pub const SYMBOLIZER: &str = "llvm-symbolizer";

/// Where one address lookup stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    /// Address written, nothing read yet
    AwaitFirstPair,
    /// Blank sentinel written, reading the rest of the inline chain
    AwaitMoreOrBlank,
    Done,
}

pub struct LineResolver {
    pool: SharedPool,
    cache: LibraryCache<Vec<SourceFrame>>,
}

impl LineResolver {
    #[must_use]
    pub fn new(pool: SharedPool) -> Self {
        Self { pool, cache: LibraryCache::new() }
    }

    /// Resolve each address to its inline chain, innermost frame first.
    ///
    /// Returns `Ok(None)` when the library has no symbols or the symbolizer
    /// cannot be started. An address whose exchange fails gets a single
    /// degraded frame instead of failing the batch.
    ///
    /// # Errors
    /// Only session-level failures, such as a missing toolchain.
    pub fn resolve(
        &mut self,
        toolchain: &Toolchain,
        library: &Library,
        addrs: &[Address],
    ) -> Result<Option<HashMap<String, Vec<SourceFrame>>>, SymbolError> {
        let mut sorted = addrs.to_vec();
        sorted.sort();
        sorted.dedup();

        let (mut result, misses) = self.cache.split(library.name(), &sorted);
        if misses.is_empty() {
            return Ok(Some(result));
        }

        let Some(symbols) = library.symbols() else {
            return Ok(None);
        };

        let command = symbolizer_command(&toolchain.tool_path(SYMBOLIZER)?, symbols);
        let mut pool = lock_pool(&self.pool);
        let mut started = false;

        for addr in &misses {
            let outcome = pool.acquire(&command).map(|channel| query_address(channel, addr));
            let frames = match outcome {
                Ok(Ok(frames)) => frames,
                Ok(Err(e)) => {
                    warn!("{SYMBOLIZER} lookup of {addr} in {} failed: {e}", library.name());
                    pool.discard(&command);
                    vec![SourceFrame::degraded(library.name(), &e.to_string())]
                }
                Err(e) if !started => {
                    warn!("{e}");
                    return Ok(None);
                }
                Err(e) => {
                    warn!("{e}");
                    vec![SourceFrame::degraded(library.name(), &e.to_string())]
                }
            };
            started = true;

            self.cache.insert(library.name(), addr, frames.clone());
            result.insert(addr.text().to_string(), frames);
        }

        Ok(Some(result))
    }
}

fn symbolizer_command(tool: &Path, symbols: &Path) -> ToolCommand {
    ToolCommand::new(tool).args([
        "--functions".to_string(),
        "--inlines".to_string(),
        "--demangle".to_string(),
        format!("--obj={}", symbols.display()),
        "--output-style=GNU".to_string(),
    ])
}

fn query_address(channel: &mut ToolProcess, addr: &Address) -> io::Result<Vec<SourceFrame>> {
    channel.write_line(&format!("{:#x}", addr.value()))?;

    let mut frames = Vec::new();
    let mut state = Exchange::AwaitFirstPair;
    while state != Exchange::Done {
        let symbol = next_line(channel)?;
        if symbol.is_empty() {
            state = Exchange::Done;
            continue;
        }

        let location = next_line(channel)?;
        frames.push(SourceFrame::new(symbol, location));

        if state == Exchange::AwaitFirstPair {
            channel.write_line("")?;
            state = Exchange::AwaitMoreOrBlank;
        }
    }

    Ok(frames)
}

fn next_line(channel: &mut ToolProcess) -> io::Result<String> {
    match channel.read_line()? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{SYMBOLIZER} closed its output"),
        )),
    }
}
