/// Per-detection output: the evidence text log and the NDJSON live stream.
///
/// Every suspicious detection is handed to each configured
/// [`DetectionSink`]. The evidence log is an append-only text file with one
/// line per detection; the stream writes one JSON object per line to any
/// `io::Write` (stdout in the binary) for companion tooling.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::protocol::{
    bounded, Detection, MacString, NameString, StreamMatch, StreamMessage, MAX_MSG_LEN,
    MAX_STREAM_MATCHES, VERSION,
};

/// Default evidence log file name inside the logs directory.
pub const EVIDENCE_LOG_FILE: &str = "skimmer_log.txt";

/// Append-only consumer of single detections.
pub trait DetectionSink: Send {
    fn record(&mut self, detection: &Detection) -> Result<(), SinkError>;
}

// ── Evidence log ───────────────────────────────────────────────────────

/// Text evidence log, one line per suspicious detection:
///
/// ```text
/// [2024-05-01T14:03:11.204518] THREAT_LEVEL_10: HC-05 (98:D3:31:F5:1A:2B) RSSI:-45
/// ```
pub struct TextEvidenceLog {
    path: PathBuf,
}

impl TextEvidenceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<logs_dir>/skimmer_log.txt`
    pub fn in_dir(logs_dir: &Path) -> Self {
        Self::new(logs_dir.join(EVIDENCE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Format one evidence line (without the trailing newline).
pub fn evidence_line(detection: &Detection) -> String {
    let obs = &detection.observation;
    format!(
        "[{}] THREAT_LEVEL_{}: {} ({}) RSSI:{}",
        obs.timestamp().format("%Y-%m-%dT%H:%M:%S%.6f"),
        detection.threat_level(),
        obs.name(),
        obs.address(),
        obs.rssi()
    )
}

impl DetectionSink for TextEvidenceLog {
    fn record(&mut self, detection: &Detection) -> Result<(), SinkError> {
        let io_err = |source: std::io::Error| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{}", evidence_line(detection)).map_err(io_err)
    }
}

// ── NDJSON stream ──────────────────────────────────────────────────────

/// Serialize a stream message to JSON bytes followed by a newline.
/// Returns the number of bytes written.
pub fn serialize_message(msg: &StreamMessage, buf: &mut [u8]) -> Result<usize, SinkError> {
    let len = serde_json_core::to_slice(msg, buf).map_err(|_| SinkError::LineOverflow(buf.len()))?;
    // Room for the NDJSON delimiter
    if len >= buf.len() {
        return Err(SinkError::LineOverflow(buf.len()));
    }
    buf[len] = b'\n';
    Ok(len + 1)
}

/// Serialize a detection as a `skimmer` stream line.
///
/// Long names are truncated on a character boundary; at most
/// [`MAX_STREAM_MATCHES`] reasons are carried.
pub fn encode_detection(detection: &Detection, buf: &mut [u8]) -> Result<usize, SinkError> {
    let obs = &detection.observation;
    let mac: MacString = bounded(obs.address());
    let name: NameString = bounded(obs.name());

    let mut matches = heapless::Vec::<StreamMatch, MAX_STREAM_MATCHES>::new();
    for reason in &detection.classification.reasons {
        let entry = StreamMatch {
            kind: reason.kind.as_str(),
            detail: bounded(&reason.detail),
        };
        if matches.push(entry).is_err() {
            break;
        }
    }

    let msg = StreamMessage::Skimmer {
        mac: &mac,
        name: &name,
        rssi: obs.rssi(),
        threat: detection.threat_level(),
        matches: &matches,
        ts: obs.timestamp().timestamp_millis(),
    };
    serialize_message(&msg, buf)
}

/// NDJSON writer over any byte sink.
pub struct NdjsonStream<W> {
    writer: W,
    buf: [u8; MAX_MSG_LEN],
}

impl<W: Write + Send> NdjsonStream<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: [0; MAX_MSG_LEN],
        }
    }

    /// Emit a `status` line.
    pub fn status(&mut self, scanning: bool, scans: u64, detections: u64, unique: usize) -> Result<(), SinkError> {
        let msg = StreamMessage::Status {
            scanning,
            scans,
            detections,
            unique: u32::try_from(unique).unwrap_or(u32::MAX),
            version: VERSION,
        };
        let len = serialize_message(&msg, &mut self.buf)?;
        self.flush_line(len)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn flush_line(&mut self, len: usize) -> Result<(), SinkError> {
        self.writer
            .write_all(&self.buf[..len])
            .and_then(|()| self.writer.flush())
            .map_err(SinkError::Stream)
    }
}

impl<W: Write + Send> DetectionSink for NdjsonStream<W> {
    fn record(&mut self, detection: &Detection) -> Result<(), SinkError> {
        let len = encode_detection(detection, &mut self.buf)?;
        self.flush_line(len)
    }
}
