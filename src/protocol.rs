/// Payloads handed to downstream collaborators.
///
/// [`Detection`] (observation + classification) is the one record shape
/// that storage, mapping and reporting all consume. Batches and session
/// reports are JSON documents built from it. Live stream lines are
/// newline-delimited JSON (NDJSON) built from `heapless` fields so each
/// line fits a fixed buffer.
use chrono::{DateTime, Local};
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::filter::Classification;
use crate::scanner::{DeviceObservation, Location};

/// A classified observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub observation: DeviceObservation,
    #[serde(flatten)]
    pub classification: Classification,
}

impl Detection {
    pub fn threat_level(&self) -> u8 {
        self.classification.threat_level
    }
}

/// Suspicious detections from one wardriving iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardriveBatch {
    pub batch_id: std::string::String,
    pub timestamp: DateTime<Local>,
    pub device_count: usize,
    pub devices: std::vec::Vec<Detection>,
}

impl WardriveBatch {
    /// Batch for iteration `scan`, stamped now.
    pub fn new(scan: u64, devices: std::vec::Vec<Detection>) -> Self {
        let now = Local::now();
        Self {
            batch_id: format!("WARDRIVE_{}_{}", now.format("%Y%m%d_%H%M%S"), scan),
            timestamp: now,
            device_count: devices.len(),
            devices,
        }
    }
}

/// One ranked hotspot in a session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotEntry {
    pub address: std::string::String,
    pub detection_count: u32,
    pub max_threat: u8,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Location>,
}

/// End-of-session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_id: std::string::String,
    pub generated: DateTime<Local>,
    pub total_scans: u64,
    pub total_detections: u64,
    pub unique_devices: usize,
    pub hotspots: std::vec::Vec<HotspotEntry>,
}

impl SessionReport {
    pub fn new(
        total_scans: u64,
        total_detections: u64,
        unique_devices: usize,
        hotspots: std::vec::Vec<HotspotEntry>,
    ) -> Self {
        let now = Local::now();
        Self {
            report_id: format!("WARDRIVE_REPORT_{}", now.format("%Y%m%d_%H%M%S")),
            generated: now,
            total_scans,
            total_detections,
            unique_devices,
            hotspots,
        }
    }
}

// ── NDJSON stream ──────────────────────────────────────────────────────

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for device name strings
pub type NameString = String<33>;

/// Maximum length for match detail strings (fits a 128-bit UUID)
pub type MatchDetail = String<40>;

/// Maximum number of match reasons carried on one line
pub const MAX_STREAM_MATCHES: usize = 4;

/// A heuristic match on a stream line
#[derive(Debug, Clone, Serialize)]
pub struct StreamMatch {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub detail: MatchDetail,
}

/// Lines written to the live NDJSON stream
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum StreamMessage<'a> {
    /// Suspicious device
    #[serde(rename = "skimmer")]
    Skimmer {
        mac: &'a MacString,
        name: &'a NameString,
        rssi: i16,
        threat: u8,
        /// Why this device was flagged
        #[serde(rename = "match")]
        matches: &'a Vec<StreamMatch, MAX_STREAM_MATCHES>,
        /// Unix time in milliseconds
        ts: i64,
    },
    /// Session progress
    #[serde(rename = "status")]
    Status {
        scanning: bool,
        scans: u64,
        detections: u64,
        unique: u32,
        version: &'static str,
    },
}

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized NDJSON line
pub const MAX_MSG_LEN: usize = 512;

/// Copy `s` into a bounded string, dropping whole characters that don't fit.
pub fn bounded<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
