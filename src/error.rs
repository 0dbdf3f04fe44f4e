/// Error types for the scanning engine.
///
/// Nothing here is fatal to the host process. Each type is absorbed at a
/// specific layer: backends return [`ScanError`] to the `Scanner`, which
/// falls back or degrades to an empty result; sinks and location providers
/// return [`SinkError`] / [`LocationError`] to the wardriving loop, which
/// logs and carries on. Only [`WardriveError`] ends a session, and even
/// then the session report is still produced.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to run a host command (spawn failure, not a non-zero exit).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A scan backend failed during a call.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The inquiry subprocess could not be executed.
    #[error("scan process error: {0}")]
    Process(#[from] CommandError),

    /// The platform BLE stack reported an error.
    #[error("platform scan failed: {reason}")]
    Platform { reason: String },

    /// No usable adapter was found on the platform stack.
    #[error("no Bluetooth adapter available")]
    NoAdapter,
}

/// The location provider could not produce a fix.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("gpsd connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("gpsd reported no position fix")]
    NoFix,
}

/// A downstream collaborator (evidence log, batch/report store) rejected a write.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stream write failed: {0}")]
    Stream(#[source] io::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NDJSON message does not fit the {0}-byte line buffer")]
    LineOverflow(usize),
}

/// Invalid runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read rule file {path}: {source}")]
    RuleFileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid rule file {path}: {source}")]
    RuleFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("scan interval must be at least {min}s, got {got}s")]
    IntervalTooShort { min: u64, got: u64 },
}

/// Errors surfaced by the wardriving controller.
#[derive(Debug, Error)]
pub enum WardriveError {
    /// `start` was called on a controller that already ran a session.
    #[error("controller is {0:?}, a session can only start from Idle")]
    NotIdle(crate::wardrive::SessionState),

    /// Unexpected internal failure during an iteration. Ends the loop.
    #[error("wardrive iteration {scan} failed: {reason}")]
    Loop { scan: u64, reason: String },
}
