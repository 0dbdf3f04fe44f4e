//! Skimmer Sentinel library: Bluetooth skimmer detection engine.
//!
//! Scans nearby Bluetooth devices, flags the ones that look like covert
//! serial modules planted on payment terminals, scores their threat and
//! aggregates repeat sightings into hotspots while wardriving.
//!
//! The library is organized leaf-first:
//! - **Detection**: `defaults`, `filter` (rule tables and the classifier).
//! - **Discovery**: `host`, `adapter`, `scanner` (process seam, adapter
//!   readiness, scan backends with fallback).
//! - **Sessions**: `tracker`, `wardrive`, `recon` (history, the continuous
//!   loop, one-shot assessment).
//! - **Output**: `protocol`, `comm`, `export`, `gps` (payloads, evidence and
//!   NDJSON sinks, JSON files, location providers).
//!
//! The `sentinel` binary is a thin consumer that wires these to the host.

pub mod adapter;
pub mod comm;
pub mod config;
pub mod defaults;
pub mod error;
pub mod export;
pub mod filter;
pub mod gps;
pub mod host;
pub mod protocol;
pub mod recon;
pub mod scanner;
pub mod tracker;
pub mod wardrive;
