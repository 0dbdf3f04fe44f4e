/// Skimmer heuristics over a single device observation.
///
/// Two pure functions over an injected [`RuleSet`]:
/// - [`Classifier::is_suspicious`]: logical OR of four independent rules
///   (name signature, proximity, skimmer service, short generic name).
/// - [`Classifier::assess_threat`]: additive 0–10 severity score.
///
/// These are triage heuristics, not proof. The OR over independent rules
/// will fire on short generic names such as "COM-12"; that noise is kept
/// as-is rather than tightened.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::scanner::DeviceObservation;

/// Maximum threat level.
pub const MAX_THREAT: u8 = 10;

/// Score for a high-confidence module name.
const MARKER_SCORE: u8 = 7;
/// RSSI above this scores as close range.
const NEAR_RSSI_DBM: i16 = -50;
const NEAR_SCORE: u8 = 3;
/// RSSI above this (but not near) scores as in range.
const IN_RANGE_RSSI_DBM: i16 = -70;
const IN_RANGE_SCORE: u8 = 1;
const SERVICES_SCORE: u8 = 2;
/// RSSI above this adds a bonus on top of the near score.
const VERY_CLOSE_RSSI_DBM: i16 = -30;
const VERY_CLOSE_SCORE: u8 = 2;

/// Rule tables consumed by the classifier.
///
/// Deserializable so a rule file can override any table; keys missing from
/// the file keep the compiled-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Module name signatures (case-insensitive substring).
    pub name_signatures: Vec<String>,
    /// Skimmer service UUIDs (compared lowercased).
    pub service_uuids: BTreeSet<String>,
    /// Generic name fragments, only suspicious on short names.
    pub generic_substrings: Vec<String>,
    /// Names must be shorter than this for the generic rule to apply.
    pub generic_name_max_len: usize,
    /// Strongest module names, scored case-sensitively.
    pub high_confidence_markers: Vec<String>,
    /// RSSI (dBm) above which any device is suspicious.
    pub proximity_rssi: i16,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            name_signatures: to_owned_vec(defaults::SKIMMER_NAME_SIGNATURES),
            service_uuids: defaults::SKIMMER_SERVICE_UUIDS
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            generic_substrings: to_owned_vec(defaults::GENERIC_NAME_SUBSTRINGS),
            generic_name_max_len: defaults::GENERIC_NAME_MAX_LEN,
            high_confidence_markers: to_owned_vec(defaults::HIGH_CONFIDENCE_MARKERS),
            proximity_rssi: defaults::PROXIMITY_RSSI_DBM,
        }
    }
}

fn to_owned_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn to_upper_vec(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_uppercase()).collect()
}

/// Which heuristic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Name contains a known skimmer module signature.
    NameSignature,
    /// Signal strong enough to suggest a concealed nearby transmitter.
    Proximity,
    /// Advertises a known skimmer service.
    Service,
    /// Short name containing a generic serial/Bluetooth fragment.
    GenericName,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::NameSignature => "name_signature",
            MatchKind::Proximity => "proximity",
            MatchKind::Service => "service",
            MatchKind::GenericName => "generic_name",
        }
    }
}

/// A single heuristic match with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReason {
    #[serde(rename = "type")]
    pub kind: MatchKind,
    pub detail: String,
}

/// Outcome of classifying one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_suspicious: bool,
    /// Always within `0..=MAX_THREAT`.
    pub threat_level: u8,
    /// Heuristics that fired; empty when not suspicious.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<MatchReason>,
}

/// Applies a [`RuleSet`] to observations.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSet,
    /// Uppercased copies of the case-insensitive tables.
    signatures_upper: Vec<String>,
    generic_upper: Vec<String>,
    /// Lowercased service table.
    services_lower: BTreeSet<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl Classifier {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            signatures_upper: to_upper_vec(&rules.name_signatures),
            generic_upper: to_upper_vec(&rules.generic_substrings),
            services_lower: rules
                .service_uuids
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            rules,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Every heuristic that fires for `obs`, in rule order.
    pub fn matches(&self, obs: &DeviceObservation) -> Vec<MatchReason> {
        let mut reasons = Vec::new();
        let name_upper = obs.name().to_uppercase();

        if let Some(sig) = self
            .signatures_upper
            .iter()
            .zip(&self.rules.name_signatures)
            .find(|(upper, _)| name_upper.contains(upper.as_str()))
            .map(|(_, original)| original)
        {
            reasons.push(MatchReason {
                kind: MatchKind::NameSignature,
                detail: sig.clone(),
            });
        }

        if obs.rssi() > self.rules.proximity_rssi {
            reasons.push(MatchReason {
                kind: MatchKind::Proximity,
                detail: format!("{} dBm", obs.rssi()),
            });
        }

        if let Some(uuid) = obs
            .services()
            .iter()
            .find(|s| self.services_lower.contains(s.as_str()))
        {
            reasons.push(MatchReason {
                kind: MatchKind::Service,
                detail: uuid.clone(),
            });
        }

        if name_upper.chars().count() < self.rules.generic_name_max_len {
            if let Some(generic) = self
                .generic_upper
                .iter()
                .find(|g| name_upper.contains(g.as_str()))
            {
                reasons.push(MatchReason {
                    kind: MatchKind::GenericName,
                    detail: generic.clone(),
                });
            }
        }

        reasons
    }

    /// True if any heuristic fires.
    pub fn is_suspicious(&self, obs: &DeviceObservation) -> bool {
        !self.matches(obs).is_empty()
    }

    /// Severity score in `0..=MAX_THREAT`.
    pub fn assess_threat(&self, obs: &DeviceObservation) -> u8 {
        let mut score: u8 = 0;

        if self
            .rules
            .high_confidence_markers
            .iter()
            .any(|marker| obs.name().contains(marker.as_str()))
        {
            score += MARKER_SCORE;
        }

        let rssi = obs.rssi();
        if rssi > NEAR_RSSI_DBM {
            score += NEAR_SCORE;
        } else if rssi > IN_RANGE_RSSI_DBM {
            score += IN_RANGE_SCORE;
        }

        if !obs.services().is_empty() {
            score += SERVICES_SCORE;
        }

        if rssi > VERY_CLOSE_RSSI_DBM {
            score += VERY_CLOSE_SCORE;
        }

        score.min(MAX_THREAT)
    }

    /// Full classification: suspicion, score and reasons.
    pub fn classify(&self, obs: &DeviceObservation) -> Classification {
        let reasons = self.matches(obs);
        Classification {
            is_suspicious: !reasons.is_empty(),
            threat_level: self.assess_threat(obs),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(name: &str, rssi: i16, services: &[&str]) -> DeviceObservation {
        DeviceObservation::new("98:D3:31:F5:1A:2B", Some(name), Some(rssi), services.iter().copied())
    }

    fn classifier() -> Classifier {
        Classifier::new(RuleSet::default())
    }

    const SPP: &str = "00001101-0000-1000-8000-00805f9b34fb";

    // ── is_suspicious: individual rules ─────────────────────────────

    #[test]
    fn signature_match_is_case_insensitive() {
        let c = classifier();
        assert!(c.is_suspicious(&obs("hc-05", -90, &[])));
        assert!(c.is_suspicious(&obs("My linvor module", -90, &[])));
        let reasons = c.matches(&obs("jdy-31-spp", -90, &[]));
        assert_eq!(reasons[0].kind, MatchKind::NameSignature);
    }

    #[test]
    fn strong_signal_is_suspicious_regardless_of_name_or_services() {
        let c = classifier();
        for rssi in [-39, -30, -10, 0] {
            assert!(c.is_suspicious(&obs("Galaxy Buds Pro Left Ear", rssi, &[])));
            assert!(c.is_suspicious(&obs("Galaxy Buds Pro Left Ear", rssi, &["0000180f-0000-1000-8000-00805f9b34fb"])));
        }
        assert!(!c.is_suspicious(&obs("Galaxy Buds Pro Left Ear", -40, &[])));
    }

    #[test]
    fn skimmer_service_is_suspicious() {
        let c = classifier();
        let device = obs("Galaxy Buds Pro Left Ear", -85, &["0000FFE0-0000-1000-8000-00805F9B34FB"]);
        assert!(c.is_suspicious(&device));
        assert_eq!(c.matches(&device)[0].kind, MatchKind::Service);
    }

    #[test]
    fn unrelated_service_is_not_suspicious() {
        let c = classifier();
        assert!(!c.is_suspicious(&obs("Galaxy Buds Pro Left Ear", -85, &["0000180f-0000-1000-8000-00805f9b34fb"])));
    }

    #[test]
    fn generic_fragment_on_short_name_is_suspicious() {
        let c = classifier();
        let reasons = c.matches(&obs("COM-12", -85, &[]));
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].kind, MatchKind::GenericName);
        assert_eq!(reasons[0].detail, "COM");
    }

    #[test]
    fn generic_fragment_on_long_name_is_ignored() {
        let c = classifier();
        // 20 characters: at the limit, not below it
        assert!(!c.is_suspicious(&obs("Bluetooth Speaker XL", -85, &[])));
        assert!(c.is_suspicious(&obs("Bluetooth Speaker", -85, &[])));
    }

    #[test]
    fn long_random_name_with_weak_signal_is_clean() {
        assert!(!classifier().is_suspicious(&obs("RandomDevice1234567890", -80, &[])));
    }

    #[test]
    fn unknown_name_weak_signal_is_clean() {
        let device = DeviceObservation::new("00:11:22:33:44:55", None, None, Vec::<String>::new());
        assert!(!classifier().is_suspicious(&device));
    }

    #[test]
    fn all_rules_can_fire_together() {
        let reasons = classifier().matches(&obs("HC-05", -35, &[SPP]));
        let kinds: Vec<_> = reasons.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MatchKind::NameSignature,
                MatchKind::Proximity,
                MatchKind::Service,
                MatchKind::GenericName,
            ]
        );
    }

    // ── assess_threat ───────────────────────────────────────────────

    #[test]
    fn hc05_close_scores_ten() {
        assert_eq!(classifier().assess_threat(&obs("HC-05", -45, &[])), 10);
    }

    #[test]
    fn marker_is_case_sensitive() {
        // Suspicious by signature, but only exact-case markers score +7
        let c = classifier();
        let device = obs("hc-05", -80, &[]);
        assert!(c.is_suspicious(&device));
        assert_eq!(c.assess_threat(&device), 0);
    }

    #[test]
    fn rssi_tiers() {
        let c = classifier();
        assert_eq!(c.assess_threat(&obs("x", -49, &[])), 3);
        assert_eq!(c.assess_threat(&obs("x", -50, &[])), 1);
        assert_eq!(c.assess_threat(&obs("x", -69, &[])), 1);
        assert_eq!(c.assess_threat(&obs("x", -70, &[])), 0);
        assert_eq!(c.assess_threat(&obs("x", -29, &[])), 5);
    }

    #[test]
    fn any_service_adds_two() {
        let c = classifier();
        assert_eq!(
            c.assess_threat(&obs("x", -90, &["0000180f-0000-1000-8000-00805f9b34fb"])),
            2
        );
    }

    #[test]
    fn score_is_clamped() {
        let c = classifier();
        // 7 + 3 + 2 + 2 = 14 before clamping
        assert_eq!(c.assess_threat(&obs("HC-06", -20, &[SPP])), MAX_THREAT);
    }

    #[test]
    fn score_always_in_range() {
        let c = classifier();
        for name in ["HC-05", "HC-06 HC-05", "x", "Unknown"] {
            for rssi in [-127, -100, -70, -50, -40, -30, -1, 0, 20] {
                for services in [&[][..], &[SPP][..]] {
                    let level = c.assess_threat(&obs(name, rssi, services));
                    assert!(level <= MAX_THREAT, "{name} {rssi} -> {level}");
                }
            }
        }
    }

    // ── classify ────────────────────────────────────────────────────

    #[test]
    fn classify_combines_both_functions() {
        let c = classifier();
        let result = c.classify(&obs("HC-05", -45, &[]));
        assert!(result.is_suspicious);
        assert_eq!(result.threat_level, 10);
        assert!(!result.reasons.is_empty());

        let clean = c.classify(&obs("RandomDevice1234567890", -80, &[]));
        assert!(!clean.is_suspicious);
        assert!(clean.reasons.is_empty());
    }

    // ── Injected rule sets ──────────────────────────────────────────

    #[test]
    fn synthetic_rule_set_replaces_defaults() {
        let rules = RuleSet {
            name_signatures: vec!["Skim".into()],
            service_uuids: BTreeSet::new(),
            generic_substrings: vec![],
            generic_name_max_len: 0,
            high_confidence_markers: vec!["Skim".into()],
            proximity_rssi: -20,
        };
        let c = Classifier::new(rules);
        assert!(!c.is_suspicious(&obs("HC-05", -35, &[SPP])));
        assert!(c.is_suspicious(&obs("SKIMMER", -90, &[])));
        assert_eq!(c.assess_threat(&obs("Skimmer", -90, &[])), 7);
    }

    #[test]
    fn partial_rule_file_keeps_defaults() {
        let rules: RuleSet = serde_json::from_str(r#"{"proximity_rssi": -55}"#).unwrap();
        assert_eq!(rules.proximity_rssi, -55);
        assert_eq!(rules.name_signatures, RuleSet::default().name_signatures);
    }
}
