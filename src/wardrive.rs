/// Continuous wardriving sessions.
///
/// A [`WardrivingController`] runs one session: `Idle → Scanning → Stopped`.
/// Each iteration looks up a position, scans, keeps the suspicious devices,
/// records them and hands the batch to storage. Exactly one scan is in
/// flight at a time. Cancellation is cooperative and only observed between
/// iterations, so a running scan always completes.
///
/// Every exit path (cancel, `max_scans` reached, iteration fault) ends in a
/// single finalization that builds the session report and hands it to the
/// report sink.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::comm::DetectionSink;
use crate::error::{ConfigError, WardriveError};
use crate::export::{BatchSink, ReportSink};
use crate::filter::Classifier;
use crate::gps::LocationProvider;
use crate::protocol::{Detection, SessionReport, WardriveBatch};
use crate::scanner::Scanner;
use crate::tracker::HistoryTracker;

/// Subtracted from the interval to get the scan window.
pub const SCAN_MARGIN: Duration = Duration::from_secs(2);
/// Sleep between iterations.
pub const ITERATION_PAUSE: Duration = Duration::from_secs(2);
/// Shortest interval that leaves a scan window after the margin.
pub const MIN_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_INTERVAL_SECS: u64 = 15;
/// Hotspots carried in the session report.
pub const REPORT_HOTSPOTS: usize = 10;
/// Hotspots echoed to the log at the end of a session.
const SUMMARY_HOTSPOTS: usize = 5;
/// Detections carried by [`SessionStats::recent`].
const RECENT_DETECTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    /// Terminal.
    Stopped,
}

/// Requests a stop at the next iteration boundary. Cheap to clone and safe
/// to trigger from a signal handler task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WardriveConfig {
    pub interval: Duration,
    pub margin: Duration,
    pub pause: Duration,
    /// Stop after this many iterations.
    pub max_scans: Option<u64>,
    pub top_n: usize,
}

impl WardriveConfig {
    pub fn new(interval_secs: u64) -> Result<Self, ConfigError> {
        if interval_secs < MIN_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort {
                min: MIN_INTERVAL_SECS,
                got: interval_secs,
            });
        }
        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            margin: SCAN_MARGIN,
            pause: ITERATION_PAUSE,
            max_scans: None,
            top_n: REPORT_HOTSPOTS,
        })
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_max_scans(mut self, max_scans: Option<u64>) -> Self {
        self.max_scans = max_scans;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Scan window per iteration, never below one second.
    pub fn scan_duration(&self) -> Duration {
        self.interval
            .saturating_sub(self.margin)
            .max(Duration::from_secs(1))
    }
}

/// Why a session stopped.
#[derive(Debug)]
pub enum ExitReason {
    Cancelled,
    /// `max_scans` reached.
    Completed,
    Fault(WardriveError),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub exit: ExitReason,
    pub report: SessionReport,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub state: SessionState,
    pub scanning: bool,
    pub total_scans: u64,
    pub total_detections: u64,
    pub unique_devices: usize,
    /// Newest first.
    pub recent: Vec<Detection>,
}

impl SessionStats {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            scanning: false,
            total_scans: 0,
            total_detections: 0,
            unique_devices: 0,
            recent: Vec::new(),
        }
    }
}

/// Follows a session from another task. A new snapshot is published when
/// the session starts, after every iteration and once it stops.
#[derive(Debug, Clone)]
pub struct StatsHandle(watch::Receiver<SessionStats>);

impl StatsHandle {
    /// Latest published snapshot.
    pub fn current(&self) -> SessionStats {
        self.0.borrow().clone()
    }

    /// Wait for a snapshot not seen yet. `None` once the controller is gone
    /// and every snapshot has been seen.
    pub async fn changed(&mut self) -> Option<SessionStats> {
        self.0.changed().await.ok()?;
        Some(self.0.borrow_and_update().clone())
    }
}

pub struct WardrivingController {
    scanner: Arc<Scanner>,
    classifier: Classifier,
    tracker: HistoryTracker,
    evidence: Vec<Box<dyn DetectionSink>>,
    batches: Box<dyn BatchSink>,
    reports: Box<dyn ReportSink>,
    config: WardriveConfig,
    state: SessionState,
    scan_count: u64,
    cancel: CancelHandle,
    live: watch::Sender<SessionStats>,
}

impl WardrivingController {
    pub fn new(
        scanner: Arc<Scanner>,
        classifier: Classifier,
        batches: Box<dyn BatchSink>,
        reports: Box<dyn ReportSink>,
        config: WardriveConfig,
    ) -> Self {
        Self {
            scanner,
            classifier,
            tracker: HistoryTracker::new(),
            evidence: Vec::new(),
            batches,
            reports,
            config,
            state: SessionState::Idle,
            scan_count: 0,
            cancel: CancelHandle::default(),
            live: watch::channel(SessionStats::idle()).0,
        }
    }

    /// Also hand every suspicious detection to `sink`.
    pub fn with_evidence_sink(mut self, sink: Box<dyn DetectionSink>) -> Self {
        self.evidence.push(sink);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle(self.live.subscribe())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state,
            scanning: self.state == SessionState::Scanning,
            total_scans: self.scan_count,
            total_detections: self.tracker.total_detections(),
            unique_devices: self.tracker.unique_devices(),
            recent: self.tracker.recent(RECENT_DETECTIONS),
        }
    }

    fn publish(&self) {
        self.live.send_replace(self.stats());
    }

    /// Run the session until cancelled, `max_scans` is reached, or an
    /// iteration faults. Only fails if the controller is not Idle.
    pub async fn start(
        &mut self,
        location: Option<&mut dyn LocationProvider>,
    ) -> Result<SessionOutcome, WardriveError> {
        if self.state != SessionState::Idle {
            return Err(WardriveError::NotIdle(self.state));
        }
        self.state = SessionState::Scanning;
        self.publish();
        log::info!(
            "Wardriving started: {}s interval, {}s scans",
            self.config.interval.as_secs(),
            self.config.scan_duration().as_secs()
        );

        let exit = match self.run(location).await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("Wardrive loop aborted: {e}");
                ExitReason::Fault(e)
            }
        };
        let report = self.finalize();
        Ok(SessionOutcome { exit, report })
    }

    async fn run(
        &mut self,
        mut location: Option<&mut dyn LocationProvider>,
    ) -> Result<ExitReason, WardriveError> {
        let duration = self.config.scan_duration();
        loop {
            self.scan_count += 1;
            let scan = self.scan_count;
            log::info!("Wardrive scan #{scan}");

            let fix = match location.as_mut() {
                Some(provider) => match provider.locate().await {
                    Ok(fix) => Some(fix),
                    Err(e) => {
                        log::warn!("No location for scan #{scan}: {e}");
                        None
                    }
                },
                None => None,
            };

            // A panicking backend surfaces as a join error instead of
            // unwinding through the session.
            let scanner = Arc::clone(&self.scanner);
            let observations = tokio::spawn(async move { scanner.scan(duration).await })
                .await
                .map_err(|e| WardriveError::Loop {
                    scan,
                    reason: e.to_string(),
                })?;

            let detections: Vec<Detection> = observations
                .into_iter()
                .filter_map(|obs| {
                    let classification = self.classifier.classify(&obs);
                    classification.is_suspicious.then(|| Detection {
                        observation: obs.with_location(fix),
                        classification,
                    })
                })
                .collect();

            if detections.is_empty() {
                log::info!("Scan #{scan}: no suspicious devices");
            } else {
                self.record(scan, detections);
            }
            self.publish();

            if self.config.max_scans.is_some_and(|max| scan >= max) {
                log::info!("Reached {scan} scans");
                return Ok(ExitReason::Completed);
            }
            if !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }
            if self.cancel.is_cancelled() {
                log::info!("Wardrive cancelled after {scan} scans");
                return Ok(ExitReason::Cancelled);
            }
        }
    }

    fn record(&mut self, scan: u64, detections: Vec<Detection>) {
        log::warn!("Scan #{scan}: {} suspicious device(s)", detections.len());
        for detection in &detections {
            let obs = &detection.observation;
            log::warn!(
                "  {} ({}) threat {}/10, RSSI {}",
                obs.name(),
                obs.address(),
                detection.threat_level(),
                obs.rssi()
            );
            for sink in &mut self.evidence {
                if let Err(e) = sink.record(detection) {
                    log::warn!("Evidence write failed: {e}");
                }
            }
            self.tracker.record(detection.clone());
        }

        let batch = WardriveBatch::new(scan, detections);
        if let Err(e) = self.batches.save_batch(&batch) {
            log::error!("Batch {} dropped: {e}", batch.batch_id);
        }
    }

    fn finalize(&mut self) -> SessionReport {
        self.state = SessionState::Stopped;
        self.publish();
        let report = SessionReport::new(
            self.scan_count,
            self.tracker.total_detections(),
            self.tracker.unique_devices(),
            self.tracker.top_hotspots(self.config.top_n),
        );

        log::info!(
            "Wardrive complete: {} scans, {} detections, {} unique devices",
            report.total_scans,
            report.total_detections,
            report.unique_devices
        );
        for (rank, hotspot) in report.hotspots.iter().take(SUMMARY_HOTSPOTS).enumerate() {
            log::info!(
                "  {}. {}: {} hits, max threat {}/10",
                rank + 1,
                hotspot.address,
                hotspot.detection_count,
                hotspot.max_threat
            );
        }

        if let Err(e) = self.reports.save_report(&report) {
            log::error!("Session report {} not saved: {e}", report.report_id);
        }
        report
    }
}


#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::fake::RecordingStore;
    use super::*;
    use crate::error::{LocationError, ScanError};
    use crate::gps::FixedLocation;
    use crate::scanner::fake::{CannedBackend, StaticProbe};
    use crate::scanner::{DeviceObservation, Location, ScanBackend};

    fn skimmer() -> DeviceObservation {
        DeviceObservation::new("98:D3:31:F5:1A:2B", Some("HC-05"), Some(-45), Vec::<String>::new())
    }

    fn speaker() -> DeviceObservation {
        DeviceObservation::new(
            "00:1A:7D:DA:71:13",
            Some("Living Room Speaker"),
            Some(-90),
            Vec::<String>::new(),
        )
    }

    fn scanner_with(backend: impl ScanBackend + 'static) -> Arc<Scanner> {
        Arc::new(Scanner::new(Box::new(StaticProbe(true)), None, Box::new(backend)))
    }

    fn config(max_scans: Option<u64>) -> WardriveConfig {
        WardriveConfig::new(10)
            .unwrap()
            .with_pause(Duration::ZERO)
            .with_max_scans(max_scans)
    }

    fn controller(
        backend: impl ScanBackend + 'static,
        batches: RecordingStore,
        reports: RecordingStore,
        max_scans: Option<u64>,
    ) -> WardrivingController {
        WardrivingController::new(
            scanner_with(backend),
            Classifier::default(),
            Box::new(batches),
            Box::new(reports),
            config(max_scans),
        )
    }

    struct PanickingBackend;

    #[async_trait]
    impl ScanBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn scan(&self, _duration: Duration) -> Result<Vec<DeviceObservation>, ScanError> {
            panic!("driver crashed");
        }
    }

    // ── Config ──────────────────────────────────────────────────────

    #[test]
    fn scan_window_is_interval_minus_margin() {
        assert_eq!(WardriveConfig::new(15).unwrap().scan_duration(), Duration::from_secs(13));
        assert_eq!(WardriveConfig::new(3).unwrap().scan_duration(), Duration::from_secs(1));
    }

    #[test]
    fn interval_below_minimum_is_rejected() {
        assert!(matches!(
            WardriveConfig::new(2),
            Err(ConfigError::IntervalTooShort { min: 3, got: 2 })
        ));
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    // ── Session lifecycle ───────────────────────────────────────────

    #[tokio::test]
    async fn three_quiet_iterations_then_cancel_reports_once() {
        let backend = CannedBackend::new("fallback");
        let batches = RecordingStore::default();
        let reports = RecordingStore::default();
        let mut ctl = controller(backend.clone(), batches.clone(), reports.clone(), None);

        // Cancel from inside the third iteration
        let cancel = ctl.cancel_handle();
        let mut calls = 0;
        let mut provider = move || -> Result<Location, LocationError> {
            calls += 1;
            if calls == 3 {
                cancel.cancel();
            }
            Ok(Location::new(0.0, 0.0))
        };

        assert_eq!(ctl.state(), SessionState::Idle);
        let outcome = ctl.start(Some(&mut provider)).await.unwrap();

        assert!(matches!(outcome.exit, ExitReason::Cancelled));
        assert_eq!(outcome.report.total_scans, 3);
        assert_eq!(outcome.report.total_detections, 0);
        assert!(outcome.report.hotspots.is_empty());
        assert_eq!(backend.call_count(), 3);
        assert_eq!(batches.batch_count(), 0);
        assert_eq!(reports.report_count(), 1);
        assert_eq!(ctl.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn suspicious_devices_are_recorded_and_batched() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer(), speaker()]);
        let batches = RecordingStore::default();
        let reports = RecordingStore::default();
        let evidence = RecordingStore::default();
        let mut ctl = controller(backend, batches.clone(), reports.clone(), Some(2))
            .with_evidence_sink(Box::new(evidence.clone()));

        let mut gps = FixedLocation::default();
        let outcome = ctl.start(Some(&mut gps)).await.unwrap();

        assert!(matches!(outcome.exit, ExitReason::Completed));
        let report = outcome.report;
        assert_eq!(report.total_scans, 2);
        assert_eq!(report.total_detections, 2);
        assert_eq!(report.unique_devices, 1);
        assert_eq!(report.hotspots[0].address, "98:D3:31:F5:1A:2B");
        assert_eq!(report.hotspots[0].detection_count, 2);
        assert_eq!(report.hotspots[0].max_threat, 10);

        let saved = batches.batches.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].device_count, 1);
        assert_eq!(
            saved[0].devices[0].observation.location(),
            Some(crate::gps::SIMULATED_LOCATION)
        );
        assert!(saved[1].batch_id.ends_with("_2"));
        assert_eq!(evidence.detections.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn location_failure_scans_without_position() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer()]);
        let batches = RecordingStore::default();
        let mut ctl = controller(backend, batches.clone(), RecordingStore::default(), Some(1));

        let mut broken = || -> Result<Location, LocationError> { Err(LocationError::NoFix) };
        let outcome = ctl.start(Some(&mut broken)).await.unwrap();

        assert_eq!(outcome.report.total_detections, 1);
        let saved = batches.batches.lock().unwrap();
        assert!(saved[0].devices[0].observation.location().is_none());
    }

    #[tokio::test]
    async fn backend_scans_for_interval_minus_margin() {
        let backend = CannedBackend::new("fallback");
        let mut ctl = controller(backend.clone(), RecordingStore::default(), RecordingStore::default(), Some(2));

        ctl.start(None).await.unwrap();

        // interval 10s, margin 2s
        assert_eq!(
            *backend.durations.lock().unwrap(),
            [Duration::from_secs(8), Duration::from_secs(8)]
        );
    }

    #[tokio::test]
    async fn evidence_failures_do_not_lose_detections() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer()]);
        let batches = RecordingStore::default();
        let healthy = RecordingStore::default();
        let mut ctl = controller(backend, batches.clone(), RecordingStore::default(), Some(2))
            .with_evidence_sink(Box::new(RecordingStore::failing()))
            .with_evidence_sink(Box::new(healthy.clone()));

        let outcome = ctl.start(None).await.unwrap();

        assert!(matches!(outcome.exit, ExitReason::Completed));
        assert_eq!(outcome.report.total_detections, 2);
        assert_eq!(outcome.report.hotspots[0].detection_count, 2);
        assert_eq!(batches.batch_count(), 2);
        assert_eq!(healthy.detections.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_failures_do_not_stop_the_loop() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer()]);
        let reports = RecordingStore::default();
        let mut ctl = controller(backend.clone(), RecordingStore::failing(), reports.clone(), Some(3));

        let outcome = ctl.start(None).await.unwrap();

        assert_eq!(outcome.report.total_scans, 3);
        assert_eq!(outcome.report.total_detections, 3);
        assert_eq!(backend.call_count(), 3);
        assert_eq!(reports.report_count(), 1);
    }

    #[tokio::test]
    async fn report_is_returned_even_if_sink_fails() {
        let mut ctl = controller(
            CannedBackend::new("fallback"),
            RecordingStore::default(),
            RecordingStore::failing(),
            Some(1),
        );
        let outcome = ctl.start(None).await.unwrap();
        assert_eq!(outcome.report.total_scans, 1);
    }

    #[tokio::test]
    async fn iteration_fault_still_finalizes() {
        let reports = RecordingStore::default();
        let mut ctl = controller(PanickingBackend, RecordingStore::default(), reports.clone(), None);

        let outcome = ctl.start(None).await.unwrap();

        assert!(matches!(
            outcome.exit,
            ExitReason::Fault(WardriveError::Loop { scan: 1, .. })
        ));
        assert_eq!(outcome.report.total_scans, 1);
        assert_eq!(reports.report_count(), 1);
        assert_eq!(ctl.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn session_cannot_be_restarted() {
        let reports = RecordingStore::default();
        let mut ctl = controller(CannedBackend::new("fallback"), RecordingStore::default(), reports.clone(), Some(1));
        ctl.start(None).await.unwrap();

        assert!(matches!(
            ctl.start(None).await,
            Err(WardriveError::NotIdle(SessionState::Stopped))
        ));
        assert_eq!(reports.report_count(), 1);
    }

    #[tokio::test]
    async fn stats_reflect_the_session() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer()]);
        let mut ctl = controller(backend, RecordingStore::default(), RecordingStore::default(), Some(12));

        let idle = ctl.stats();
        assert_eq!(idle.state, SessionState::Idle);
        assert!(!idle.scanning);

        ctl.start(None).await.unwrap();
        let stats = ctl.stats();
        assert!(!stats.scanning);
        assert_eq!(stats.total_scans, 12);
        assert_eq!(stats.total_detections, 12);
        assert_eq!(stats.unique_devices, 1);
        assert_eq!(stats.recent.len(), 10);
    }

    #[tokio::test]
    async fn live_stats_follow_a_running_session() {
        let backend = CannedBackend::new("fallback").then_ok(vec![skimmer()]);
        let mut ctl = controller(backend, RecordingStore::default(), RecordingStore::default(), Some(3));
        let live = ctl.stats_handle();
        let mut follower = ctl.stats_handle();

        // Sample the published stats at the start of every iteration
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let samples = Arc::clone(&seen);
        let watcher = live.clone();
        let mut provider = move || -> Result<Location, LocationError> {
            let s = watcher.current();
            samples
                .lock()
                .unwrap()
                .push((s.scanning, s.total_scans, s.total_detections));
            Ok(Location::new(0.0, 0.0))
        };

        ctl.start(Some(&mut provider)).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [(true, 0, 0), (true, 1, 1), (true, 2, 2)]
        );
        let last = live.current();
        assert_eq!(last.state, SessionState::Stopped);
        assert!(!last.scanning);
        assert_eq!(last.total_scans, 3);
        assert_eq!(last.unique_devices, 1);

        drop(ctl);
        let final_stats = follower.changed().await.unwrap();
        assert_eq!(final_stats.state, SessionState::Stopped);
        assert!(follower.changed().await.is_none());
    }
}
