/// One-shot threat assessment of the current location.
use std::time::Duration;

use serde::Serialize;

use crate::comm::DetectionSink;
use crate::filter::Classifier;
use crate::protocol::Detection;
use crate::scanner::Scanner;

pub const DEFAULT_RECON_SECS: u64 = 15;

/// Threat at or above this calls for immediate action.
const IMMEDIATE_THREAT: u8 = 8;
/// Threat at or above this calls for a closer look.
const INVESTIGATE_THREAT: u8 = 5;

/// What the operator should do after a recon scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ImmediateAction,
    Investigate,
    Monitor,
}

impl Recommendation {
    pub fn for_threat(max_threat: u8) -> Self {
        if max_threat >= IMMEDIATE_THREAT {
            Recommendation::ImmediateAction
        } else if max_threat >= INVESTIGATE_THREAT {
            Recommendation::Investigate
        } else {
            Recommendation::Monitor
        }
    }

    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            Recommendation::ImmediateAction => &[
                "Notify station management",
                "Call police non-emergency",
                "Warn customers discreetly",
                "Document with photos from a distance",
            ],
            Recommendation::Investigate => &["Inspect the terminals", "Consider notifying authorities"],
            Recommendation::Monitor => &["Re-scan on the next patrol"],
        }
    }
}

/// Outcome of one recon scan.
#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub station: String,
    pub devices_seen: usize,
    /// Suspicious devices only.
    pub detections: Vec<Detection>,
    pub max_threat: u8,
    /// `None` when nothing suspicious was seen.
    pub recommendation: Option<Recommendation>,
}

/// Scan once for `duration`, classify, write evidence for every suspicious
/// device and recommend a response.
pub async fn recon(
    station: &str,
    scanner: &Scanner,
    classifier: &Classifier,
    evidence: &mut [Box<dyn DetectionSink>],
    duration: Duration,
) -> ReconReport {
    log::info!("Recon scan at {station}");
    let observations = scanner.scan(duration).await;
    let devices_seen = observations.len();

    let detections: Vec<Detection> = observations
        .into_iter()
        .filter_map(|observation| {
            let classification = classifier.classify(&observation);
            classification.is_suspicious.then_some(Detection {
                observation,
                classification,
            })
        })
        .collect();

    for detection in &detections {
        for sink in evidence.iter_mut() {
            if let Err(e) = sink.record(detection) {
                log::warn!("Evidence write failed: {e}");
            }
        }
    }

    let max_threat = detections
        .iter()
        .map(Detection::threat_level)
        .max()
        .unwrap_or(0);
    let recommendation = (!detections.is_empty()).then(|| Recommendation::for_threat(max_threat));

    match recommendation {
        Some(rec) => log::warn!(
            "{station}: {} suspicious device(s), max threat {max_threat}/10, {rec:?}",
            detections.len()
        ),
        None => log::info!("{station}: no immediate threats ({devices_seen} device(s) seen)"),
    }

    ReconReport {
        station: station.to_owned(),
        devices_seen,
        detections,
        max_threat,
        recommendation,
    }
}
