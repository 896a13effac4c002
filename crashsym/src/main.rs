//! # crashsym - Main Entry Point
//!
//! Supports two operational modes:
//! - **Resolve** (`--lib <LIB> ADDR...`): symbolize addresses in one library
//! - **Demangle** (`--demangle SYMBOL...`): demangle C++ names
//!
//! Lookups run on a blocking thread while the async side waits for
//! termination signals, so a Ctrl+C never leaves tool processes behind.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crashsym::arch::detect_arch;
use crashsym::cli::Args;
use crashsym::config::SessionConfig;
use crashsym::domain::{Arch, SymbolError, SymbolRecord};
use crashsym::shutdown::TerminationSignals;
use crashsym::symbolization::Session;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SymbolError>() {
        Some(SymbolError::ArchUndetermined | SymbolError::InvalidAddress(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

/// Pick the target architecture: `--arch` wins, then detection from `--log`.
fn resolve_arch(args: &Args, config: &SessionConfig) -> Result<Arch> {
    if let Some(ref arch) = args.arch {
        return Ok(Arch::from(arch.as_str()));
    }

    let Some(ref log) = args.log else {
        return Err(SymbolError::ArchUndetermined.into());
    };

    let contents = std::fs::read_to_string(log)
        .with_context(|| format!("Failed to read crash log: {}", log.display()))?;
    Ok(detect_arch(contents.lines(), &config.hints)?)
}

fn session_config(args: &Args) -> SessionConfig {
    let mut config = SessionConfig::from_env();
    if args.symbols_dir.is_some() {
        config.symbols_dir.clone_from(&args.symbols_dir);
    }
    if args.toolchain_dir.is_some() {
        config.toolchain_dir.clone_from(&args.toolchain_dir);
    }
    config.io_timeout = Duration::from_secs(args.timeout_secs);
    config
}

#[derive(Serialize)]
struct AddressReport {
    address: String,
    records: Vec<SymbolRecord>,
}

/// Resolve mode: one block per address, in the order given.
fn print_records(reports: &[AddressReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }

    for report in reports {
        println!("{}", report.address);
        for record in &report.records {
            println!(
                "  {}  {}  {}",
                record.source_symbol.as_deref().unwrap_or("??"),
                record.source_location.as_deref().unwrap_or("??:0"),
                record.object_symbol_with_offset.as_deref().unwrap_or("??"),
            );
        }
    }
    Ok(())
}

fn print_demangled(names: &BTreeMap<String, String>, order: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(names)?);
        return Ok(());
    }

    for mangled in order {
        if let Some(demangled) = names.get(mangled) {
            println!("{demangled}");
        }
    }
    Ok(())
}

fn resolve_addresses(
    session: &mut Session,
    lib: &str,
    addresses: &[String],
) -> Result<Vec<AddressReport>> {
    let results = session
        .symbol_information_for_set(lib, addresses)
        .with_context(|| format!("Failed to symbolize addresses in {lib}"))?;

    let reports = addresses
        .iter()
        .map(|address| AddressReport {
            address: address.clone(),
            records: results
                .get(address)
                .cloned()
                .unwrap_or_else(|| vec![SymbolRecord::unknown()]),
        })
        .collect();
    Ok(reports)
}

fn demangle_all(session: &mut Session, names: &[String]) -> Result<BTreeMap<String, String>> {
    let mut demangled = BTreeMap::new();
    for mangled in names {
        match session.demangle(mangled) {
            Ok(name) => {
                demangled.insert(mangled.clone(), name);
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Could not demangle {mangled}: {e}");
                demangled.insert(mangled.clone(), mangled.clone());
            }
        }
    }
    Ok(demangled)
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let config = session_config(&args);

    let demangle_mode = !args.demangle.is_empty();
    let arch = if demangle_mode { config.hints.arch_64() } else { resolve_arch(&args, &config)? };

    if !args.quiet && !args.json {
        eprintln!("crashsym v{}", env!("CARGO_PKG_VERSION"));
        if !demangle_mode {
            eprintln!("arch: {arch}");
        }
    }

    // Installed before any tool is spawned, so no signal can slip past teardown
    let mut signals = TerminationSignals::install().context("Failed to install signal handlers")?;
    let mut session = Session::new(config, arch);

    // Children must not outlive us when interrupted
    let shutdown = session.shutdown_handle();
    tokio::spawn(async move {
        let signo = signals.recv().await;
        info!("Received signal {signo}, terminating tool processes");
        let _ = tokio::task::spawn_blocking(move || shutdown.shutdown()).await;
        std::process::exit(128 + signo);
    });

    let json = args.json;
    if demangle_mode {
        let names = args.demangle;
        let (demangled, names) = tokio::task::spawn_blocking(move || {
            demangle_all(&mut session, &names).map(|demangled| (demangled, names))
        })
        .await
        .context("Demangler task panicked")??;
        return print_demangled(&demangled, &names, json);
    }

    // Guaranteed by clap outside demangle mode
    let lib = args.lib.context("Missing required argument: --lib")?;
    let addresses = args.addresses;
    let reports =
        tokio::task::spawn_blocking(move || resolve_addresses(&mut session, &lib, &addresses))
            .await
            .context("Symbolization task panicked")??;

    print_records(&reports, json)
}
