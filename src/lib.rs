//! # hookscope - Runtime Function Interception Agent
//!
//! hookscope lives inside a running application, finds the functions worth
//! intercepting in whatever engine the app embeds, patches them through an
//! external interception primitive, and uses the installed hooks to rewrite
//! behavior: frame timing, in-memory currency values, and outbound request
//! payloads. Discovery results are cached on disk so later runs skip the
//! expensive searches.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Host Application                         │
//! │                  (engine module + network client)               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ intercepted calls
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     hookscope (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Process    │──▶│    Engine    │──▶│  Dispatcher  │         │
//! │  │  Discovery   │   │  Identify    │   │  (hook plan) │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               │                 │
//! │                                        ┌──────▼───────┐         │
//! │                                        │   Resolver   │         │
//! │                                        │  (4 tiers)   │         │
//! │                                        └──────┬───────┘         │
//! │                                               │                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────▼───────┐         │
//! │  │    Replay    │   │ JSON Handle  │   │ Symbol Cache │         │
//! │  │    Engine    │   │   Tracker    │   │   (disk)     │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`agent`]: the background worker that chains discovery, engine
//!   identification and hook installation, then hands the hook state to
//!   the embedder
//! - [`resolve`]: tiered symbol/offset resolution (cached export name,
//!   cached anchor-relative offset, live export-pattern search, live
//!   byte-signature scan) with persistent write-back
//! - [`store`]: the on-disk formats shared across runs (symbol cache,
//!   captured requests, currency flags)
//! - [`replay`]: capture-once/replay-thereafter engine for outbound
//!   requests
//! - [`jsontrack`]: native JSON handle -> source text correlation
//! - [`engine`]: engine identification, hook plans, and the hook behaviors
//!   themselves
//! - [`intercept`]: traits over the external interception primitive
//! - [`elf`]: file-backed implementation of the export-table and scan
//!   queries
//! - [`process`]: memory-map parsing and target library selection
//! - [`poll`]: bounded, cancellable retry for discovery races
//! - [`report`]: JSON dispatch report for post-session inspection
//! - [`cli`]: arguments for the cache maintenance binary
//!
//! ## Key Concepts
//!
//! - **Anchor export**: a reliably-named export used as the reference
//!   point for cached offsets and as the start of scan windows. Cached
//!   offsets are relative to it, never absolute, so relocation between
//!   runs is harmless.
//! - **Hook plan**: the ordered, independent steps dispatch runs for an
//!   engine; any step may fail without affecting the rest.
//! - **Hook context**: all mutable hook state, owned by the embedding
//!   glue, fed by every intercepted call. No global statics.

pub mod agent;
pub mod cli;
pub mod domain;
pub mod elf;
pub mod engine;
pub mod intercept;
pub mod jsontrack;
pub mod poll;
pub mod process;
pub mod replay;
pub mod report;
pub mod resolve;
pub mod store;
