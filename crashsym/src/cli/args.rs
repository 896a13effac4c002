//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "crashsym",
    version,
    about = "Resolve native crash addresses to functions and source lines",
    after_help = "\
EXAMPLES:
    crashsym --lib /system/lib64/libc.so --arch arm64 000374e0 0004a1c4
    crashsym --lib /system/lib/libbinder.so --log tombstone_03 000177b3
    crashsym --demangle _ZN7android7IBinderD2Ev"
)]
pub struct Args {
    /// Device path of the library the addresses belong to
    #[arg(short, long, value_name = "LIB", required_unless_present = "demangle")]
    pub lib: Option<String>,

    /// Hexadecimal addresses (offsets into LIB), with or without 0x
    #[arg(value_name = "ADDR", conflicts_with = "demangle")]
    pub addresses: Vec<String>,

    /// Demangle these symbol names instead of resolving addresses
    #[arg(long, value_name = "SYMBOL", num_args = 1..)]
    pub demangle: Vec<String>,

    /// Target architecture (arm, arm64, mips, mips64, x86, x86_64)
    #[arg(short, long, conflicts_with = "log")]
    pub arch: Option<String>,

    /// Crash report to detect the architecture from
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Directory with unstripped binaries (default: asked from the build system)
    #[arg(long, value_name = "DIR")]
    pub symbols_dir: Option<PathBuf>,

    /// Use the LLVM tools from this directory only
    #[arg(long, value_name = "DIR")]
    pub toolchain_dir: Option<PathBuf>,

    /// Seconds to wait for a tool to answer
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
