//! Session driver: merges line-level and object-level lookups per address.

use log::{debug, info, warn};
use std::collections::HashMap;

use super::demangler::Demangler;
use super::disassembly::DisassemblyResolver;
use super::library::Library;
use super::line_resolver::LineResolver;
use crate::config::SessionConfig;
use crate::domain::{Address, Arch, ObjectSymbol, SourceFrame, SymbolError, SymbolRecord};
use crate::process::{ChildRegistry, ProcessPool};
use crate::shutdown::ShutdownHandle;
use crate::toolchain::{find_symbols_dir, Toolchain};

/// One symbolization session for a single target architecture.
///
/// Owns the tool process pools and every result cache. Dropping the session
/// terminates its tool processes.
pub struct Session {
    symbols_dir: Option<std::path::PathBuf>,
    toolchain: Toolchain,
    lines: LineResolver,
    disassembly: DisassemblyResolver,
    demangler: Demangler,
    shutdown: ShutdownHandle,
}

impl Session {
    /// Start a session. Nothing is spawned until the first lookup.
    #[must_use]
    pub fn new(config: SessionConfig, arch: Arch) -> Self {
        let symbols_dir = config.symbols_dir.or_else(|| find_symbols_dir(&config.build_top));
        match symbols_dir {
            Some(ref dir) => info!("Symbols directory: {}", dir.display()),
            None => warn!("No symbols directory, libraries are looked up by path only"),
        }

        let children = ChildRegistry::new();
        let pool = || ProcessPool::new(config.pool_capacity, config.io_timeout, children.clone());
        let symbolizer_pool = pool().shared();
        let demangler_pool = pool().shared();
        let shutdown = ShutdownHandle::new(
            vec![symbolizer_pool.clone(), demangler_pool.clone()],
            children.clone(),
        );

        Self {
            disassembly: DisassemblyResolver::new(arch, config.io_timeout, children),
            symbols_dir,
            toolchain: Toolchain::new(config.build_top, config.toolchain_dir),
            lines: LineResolver::new(symbolizer_pool),
            demangler: Demangler::new(demangler_pool),
            shutdown,
        }
    }

    /// Handle that tears down this session's processes from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Symbol information for a single address.
    ///
    /// # Errors
    /// See [`Session::symbol_information_for_set`].
    pub fn symbol_information(
        &mut self,
        library: &str,
        address: &str,
    ) -> Result<Vec<SymbolRecord>, SymbolError> {
        let mut result = self.symbol_information_for_set(library, [address])?;
        Ok(result.remove(address).unwrap_or_else(|| vec![SymbolRecord::unknown()]))
    }

    /// Symbol information for a batch of addresses in one library.
    ///
    /// Every requested address gets a non-empty list, innermost inlined frame
    /// first. Unresolvable addresses get a single record with nothing set.
    ///
    /// # Errors
    /// Only fatal errors, such as a missing toolchain. Per-address failures
    /// show up as degraded records instead.
    pub fn symbol_information_for_set<I, S>(
        &mut self,
        library: &str,
        addresses: I,
    ) -> Result<HashMap<String, Vec<SymbolRecord>>, SymbolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = HashMap::new();
        let mut parsed = Vec::new();
        for text in addresses {
            let text = text.as_ref();
            match Address::parse(text) {
                Ok(addr) => parsed.push(addr),
                Err(e) => {
                    debug!("{e}");
                    result.insert(text.to_string(), vec![SymbolRecord::unknown()]);
                }
            }
        }
        parsed.sort();
        parsed.dedup();
        if parsed.is_empty() {
            return Ok(result);
        }

        let library = Library::locate(library, self.symbols_dir.as_deref());
        let toolchain = &self.toolchain;
        let mut frames = self.lines.resolve(toolchain, &library, &parsed)?.unwrap_or_default();
        let objects =
            self.disassembly.resolve(toolchain, &library, &parsed)?.unwrap_or_default();

        for addr in &parsed {
            let chain = frames.remove(addr.text()).unwrap_or_default();
            let records = merge(chain, objects.get(addr.text()));
            result.insert(addr.text().to_string(), records);
        }

        Ok(result)
    }

    /// Demangle one symbol name.
    ///
    /// # Errors
    /// [`SymbolError::DemanglerNotFound`] is fatal; other errors only affect
    /// this name.
    pub fn demangle(&mut self, mangled: &str) -> Result<String, SymbolError> {
        self.demangler.demangle(&self.toolchain, mangled)
    }

    /// Terminate all tool processes. Safe to call more than once.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn merge(chain: Vec<SourceFrame>, object: Option<&ObjectSymbol>) -> Vec<SymbolRecord> {
    let chain = if chain.is_empty() { vec![SourceFrame::default()] } else { chain };
    let object = object.map(ToString::to_string);

    chain
        .into_iter()
        .map(|frame| SymbolRecord {
            source_symbol: frame.symbol,
            source_location: frame.location,
            object_symbol_with_offset: object.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_attaches_object_symbol_to_every_frame() {
        let chain = vec![SourceFrame::new("inner", "a.cc:1"), SourceFrame::new("outer", "a.cc:9")];
        let object = ObjectSymbol { symbol: "outer".into(), offset: 16 };

        let records = merge(chain, Some(&object));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_symbol.as_deref(), Some("inner"));
        assert_eq!(records[1].source_location.as_deref(), Some("a.cc:9"));
        assert!(records.iter().all(|r| r.object_symbol_with_offset.as_deref() == Some("outer+16")));
    }

    #[test]
    fn test_merge_without_any_data() {
        assert_eq!(merge(Vec::new(), None), vec![SymbolRecord::unknown()]);
    }

    #[test]
    fn test_merge_object_only() {
        let object = ObjectSymbol { symbol: "main".into(), offset: 0 };
        let records = merge(Vec::new(), Some(&object));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_symbol, None);
        assert_eq!(records[0].object_symbol_with_offset.as_deref(), Some("main"));
    }
}
