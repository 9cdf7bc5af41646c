//! # hookscope - Cache maintenance entry point
//!
//! The agent itself is a library loaded into the target process; this
//! binary is the companion tool for looking at (and resetting) the state
//! the agent leaves on disk between runs: cached symbol resolutions,
//! captured request records, and the currency modification flags.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hookscope::cli::{Args, Command};
use hookscope::domain::{Address, MemoryRange};
use hookscope::elf::ElfSymbolSource;
use hookscope::intercept::{ModuleHandle, SymbolSource};
use hookscope::store::{CacheLayout, ModifiedState, RequestRecord};
use regex::Regex;
use std::fs;
use std::path::Path;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();

    // Export listing works straight off a module image, no cache needed.
    if let Command::Exports { path, pattern } = &args.command {
        return show_exports(path, pattern.as_deref());
    }

    let layout = resolve_layout(&args)?;
    match args.command {
        Command::Symbols => show_symbols(&layout),
        Command::Request { id } => show_request(&layout, id),
        Command::Flags => show_flags(&layout),
        Command::Clear { requests } => clear(&layout, requests),
        Command::Exports { .. } => unreachable!("handled above"),
    }
}

fn show_exports(path: &Path, pattern: Option<&str>) -> Result<()> {
    let source = ElfSymbolSource::open(path, Address::NULL)?;
    let module = ModuleHandle {
        name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        path: path.to_path_buf(),
        range: MemoryRange { start: 0, end: u64::MAX },
    };
    let filter = pattern.map(Regex::new).transpose().context("Invalid --pattern regex")?;

    let mut count = 0;
    for symbol in source.exports(&module) {
        if filter.as_ref().is_some_and(|re| !re.is_match(&symbol.name)) {
            continue;
        }
        println!("{}  {}", symbol.address, symbol.name);
        count += 1;
    }
    println!("{count} export(s)");
    Ok(())
}

fn resolve_layout(args: &Args) -> Result<CacheLayout> {
    if let Some(dir) = &args.cache_dir {
        return Ok(CacheLayout::at(dir.clone()));
    }
    if let (Some(root), Some(package)) = (&args.data_root, &args.package) {
        return Ok(CacheLayout::for_package(root, package));
    }
    bail!(
        "Missing cache location.\n\n\
         Use either:\n  \
         hookscope --cache-dir <DIR> ...\n  \
         hookscope --data-root <DIR> --package <PKG> ..."
    )
}

fn show_symbols(layout: &CacheLayout) -> Result<()> {
    let path = layout.symbol_cache_path();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => {
            println!("no symbol cache at {}", path.display());
            return Ok(());
        }
    };

    let mut count = 0;
    for line in content.lines().filter(|l| !l.is_empty()) {
        println!("{line}");
        count += 1;
    }
    println!("{count} cached resolution(s)");
    Ok(())
}

fn show_request(layout: &CacheLayout, id: i32) -> Result<()> {
    let path = layout.request_record_path(id);
    if !path.exists() {
        println!("no captured record for request {id}");
        return Ok(());
    }

    let record = RequestRecord::load(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    println!("request id:     {}", record.request_id);
    println!("operation type: {}", record.operation_type);
    println!("business args:  {:?}", record.business_args);
    println!("record time:    {}", record.record_time);
    for (i, slot) in record.string_args.iter().enumerate() {
        match slot {
            Some(s) if s.len() > 200 => {
                let head: String = s.chars().take(200).collect();
                println!("string {i}:       [len={}] {head}...", s.len());
            }
            Some(s) => println!("string {i}:       {s}"),
            None => println!("string {i}:       (null)"),
        }
    }
    Ok(())
}

fn show_flags(layout: &CacheLayout) -> Result<()> {
    let state = ModifiedState::new(layout.state_flags_path());
    let (soft, hard) = state.flags();
    println!("soft currency modified: {soft}");
    println!("hard currency modified: {hard}");
    println!("gate closed: {}", soft && hard);
    Ok(())
}

fn clear(layout: &CacheLayout, requests: bool) -> Result<()> {
    for path in [layout.symbol_cache_path(), layout.state_flags_path()] {
        match fs::remove_file(&path) {
            Ok(()) => println!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => bail!("Failed to remove {}: {e}", path.display()),
        }
    }

    if requests {
        let Ok(entries) = fs::read_dir(layout.root()) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("request_") && name.ends_with(".cache") {
                match fs::remove_file(entry.path()) {
                    Ok(()) => println!("removed {}", entry.path().display()),
                    Err(e) => bail!("Failed to remove {}: {e}", entry.path().display()),
                }
            }
        }
    }
    Ok(())
}
