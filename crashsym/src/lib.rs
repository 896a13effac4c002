//! # crashsym - Native Crash Address Symbolizer
//!
//! crashsym resolves code addresses from Android native crash reports
//! (tombstones, logcat backtraces, sanitizer reports) into function names,
//! source locations, and function+offset pairs, using the LLVM tools from the
//! platform toolchain.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 Crash report / address list                   │
//! └───────────────────────┬───────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  arch: detect target architecture from the report lines       │
//! └───────────────────────┬───────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Session (symbolization)                    │
//! │                                                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │ LineResolver │   │ Disassembly  │   │  Demangler   │       │
//! │  │ (symbolizer) │   │  (objdump)   │   │  (cxxfilt)   │       │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘       │
//! │         │                  │                  │               │
//! │         ▼                  ▼                  ▼               │
//! │  ┌──────────────────────────────────────────────────┐         │
//! │  │  process: tool channels and bounded LRU pools    │         │
//! │  └──────────────────────────────────────────────────┘         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`arch`]: architecture detection from crash report lines and toolchain hints
//! - [`toolchain`]: locating the LLVM tools and the unstripped symbols directory
//! - [`process`]: line-oriented tool channels and the bounded process pool
//! - [`symbolization`]: resolvers, caches, and the [`Session`](symbolization::Session) driver
//! - [`shutdown`]: teardown of tool processes on exit and on signals
//! - [`config`]: session configuration from the environment
//! - [`domain`]: addresses, records, and the error type
//! - [`cli`]: command-line argument parsing
//!
//! ## Typical Usage
//!
//! ```bash
//! # Resolve two addresses, detecting the architecture from a tombstone
//! crashsym --lib /system/lib64/libc.so --log tombstone_03 000374e0 0004a1c4
//!
//! # Demangle names
//! crashsym --demangle _ZN7android7IBinderD2Ev
//! ```

pub mod arch;
pub mod cli;
pub mod config;
pub mod domain;
pub mod process;
pub mod shutdown;
pub mod symbolization;
pub mod toolchain;
