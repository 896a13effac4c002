//! # Symbol Resolution for Crash Addresses
//!
//! This module turns code addresses from a native crash report (offsets into
//! a shared library) into function names, source locations, and
//! function+offset pairs. It does not read DWARF itself: it drives the LLVM
//! command-line tools shipped with the platform toolchain.
//!
//! ## Two Views of an Address
//!
//! Every address is looked up twice, by two different tools:
//!
//! - **Line-level** (`llvm-symbolizer`): the chain of inlined functions the
//!   instruction belongs to, each with its `file:line`. Optimized code often
//!   has several frames per address.
//! - **Object-level** (`llvm-objdump`): the symbol-table function the
//!   instruction physically lives in, and the byte offset into it. This is
//!   what the unwinder would print.
//!
//! The driver merges both into one list of [`SymbolRecord`]s per address:
//!
//! ```text
//! 000374e0 in /system/lib/libc.so
//!   [0] inner_helper()  bionic/libc/foo.cpp:12  outer_fn+16
//!   [1] outer_fn()      bionic/libc/foo.cpp:40  outer_fn+16
//! ```
//!
//! ## Tool Processes
//!
//! - **`llvm-symbolizer`** stays alive per library and is fed one address at a
//!   time over stdin. Its GNU output has no terminator, so a blank request
//!   is used as a sentinel (see [`line_resolver`]).
//! - **`llvm-objdump`** is run once per batch over the `[min, max]` range of
//!   the requested addresses and its listing is scanned with a cursor.
//! - **`llvm-cxxfilt`** stays alive for the whole session.
//!
//! Long-lived processes sit in a bounded LRU pool (see
//! [`crate::process::ProcessPool`]) so a crash touching many libraries does
//! not leave dozens of tools running.
//!
//! ## Caching
//!
//! Results are cached per library and per address text for the lifetime of
//! the [`Session`]. Repeated lookups never reach a tool.
//!
//! ## Failure Handling
//!
//! - Library without symbols: records with nothing set, no error.
//! - Tool hangs or dies mid-exchange: that address gets a degraded record
//!   (`libfoo.so  ***Error: ...`), the process is discarded, the batch goes on.
//! - Toolchain missing: fatal, returned as [`SymbolError`](crate::domain::SymbolError).
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut session = Session::new(SessionConfig::from_env(), Arch::Arm64);
//! let records = session.symbol_information_for_set("/system/lib64/libc.so", ["000374e0"])?;
//! for record in &records["000374e0"] {
//!     println!("{:?} {:?}", record.source_symbol, record.object_symbol_with_offset);
//! }
//! ```
//!
//! [`SymbolRecord`]: crate::domain::SymbolRecord

pub mod cache;
pub mod demangler;
pub mod disassembly;
pub mod driver;
pub mod library;
pub mod line_resolver;

pub use cache::LibraryCache;
pub use demangler::Demangler;
pub use disassembly::DisassemblyResolver;
pub use driver::Session;
pub use library::Library;
pub use line_resolver::LineResolver;
