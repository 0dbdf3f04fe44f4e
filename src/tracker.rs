/// Session sighting history and hotspot aggregation.
///
/// Recent detections live in a fixed-capacity `heapless::Deque` used as a
/// ring buffer; per-address hotspot records live in an unbounded map. Both
/// are owned by one wardriving loop and need no locking.
use std::collections::HashMap;

use chrono::{DateTime, Local};
use heapless::Deque;

use crate::protocol::{Detection, HotspotEntry};
use crate::scanner::Location;

/// Default history capacity.
pub const HISTORY_CAPACITY: usize = 1000;

/// Aggregate of every sighting of one address.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotRecord {
    pub first_seen: DateTime<Local>,
    /// Never moves backwards.
    pub last_seen: DateTime<Local>,
    pub count: u32,
    /// Never decreases.
    pub max_threat: u8,
    /// Most recent position the address was seen at, if any.
    pub last_location: Option<Location>,
}

pub struct HistoryTracker<const N: usize = HISTORY_CAPACITY> {
    history: Box<Deque<Detection, N>>,
    hotspots: HashMap<String, HotspotRecord>,
    total_detections: u64,
}

impl HistoryTracker<HISTORY_CAPACITY> {
    pub fn new() -> Self {
        Self::bounded()
    }
}

impl Default for HistoryTracker<HISTORY_CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HistoryTracker<N> {
    /// Tracker with a history capacity of `N`.
    pub fn bounded() -> Self {
        Self {
            history: Box::new(Deque::new()),
            hotspots: HashMap::new(),
            total_detections: 0,
        }
    }

    /// Append a detection, evicting the oldest one when the buffer is full,
    /// and fold it into the hotspot for its address.
    pub fn record(&mut self, detection: Detection) {
        let obs = &detection.observation;
        let seen = obs.timestamp();
        let threat = detection.threat_level();
        let location = obs.location();

        self.hotspots
            .entry(obs.address().to_owned())
            .and_modify(|h| {
                h.count = h.count.saturating_add(1);
                h.last_seen = h.last_seen.max(seen);
                h.max_threat = h.max_threat.max(threat);
                if location.is_some() {
                    h.last_location = location;
                }
            })
            .or_insert(HotspotRecord {
                first_seen: seen,
                last_seen: seen,
                count: 1,
                max_threat: threat,
                last_location: location,
            });

        if self.history.is_full() {
            self.history.pop_front();
        }
        // Room was made above
        let _ = self.history.push_back(detection);
        self.total_detections += 1;
    }

    /// Detections currently held in the buffer.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Every detection recorded this session, including evicted ones.
    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn unique_devices(&self) -> usize {
        self.hotspots.len()
    }

    pub fn hotspot(&self, address: &str) -> Option<&HotspotRecord> {
        self.hotspots.get(address)
    }

    /// Oldest detection still buffered.
    pub fn oldest(&self) -> Option<&Detection> {
        self.history.front()
    }

    /// Up to `n` most recent detections, newest first.
    pub fn recent(&self, n: usize) -> Vec<Detection> {
        self.history.iter().rev().take(n).cloned().collect()
    }

    /// The `n` addresses with the most sightings; ties go to the most
    /// recently seen.
    pub fn top_hotspots(&self, n: usize) -> Vec<HotspotEntry> {
        let mut ranked: Vec<(&String, &HotspotRecord)> = self.hotspots.iter().collect();
        ranked.sort_by(|(addr_a, a), (addr_b, b)| {
            b.count
                .cmp(&a.count)
                .then(b.last_seen.cmp(&a.last_seen))
                .then(addr_a.cmp(addr_b))
        });

        ranked
            .into_iter()
            .take(n)
            .map(|(address, h)| HotspotEntry {
                address: address.clone(),
                detection_count: h.count,
                max_threat: h.max_threat,
                first_seen: h.first_seen,
                last_seen: h.last_seen,
                last_location: h.last_location,
            })
            .collect()
    }
}
