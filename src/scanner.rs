/// Bluetooth discovery engine.
///
/// Two interchangeable backends produce [`DeviceObservation`]s:
/// - [`bluez::BluezBackend`]: timed discovery through the platform BLE stack
///   (feature `btleplug`). Preferred when it initializes at startup.
/// - [`hcitool::HcitoolBackend`]: time-boxed `hcitool scan` inquiry. Always
///   available as long as BlueZ userland is installed.
///
/// [`Scanner`] resolves the choice once and applies the fallback policy: a
/// primary failure is retried once, synchronously, on the fallback backend.
/// Callers never see a scan error.
use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterProbe;
use crate::error::ScanError;

#[cfg(feature = "btleplug")]
pub mod bluez;
pub mod hcitool;

/// Display name used when a device advertises none.
pub const UNKNOWN_NAME: &str = "Unknown";

/// RSSI assigned when the stack reports no signal strength.
pub const MISSING_RSSI: i16 = -100;

/// A latitude/longitude fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One sighting of a nearby Bluetooth device.
///
/// Fields are read-only once built; the wardriving loop attaches a location
/// by consuming the observation ([`DeviceObservation::with_location`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceObservation {
    address: String,
    name: String,
    rssi: i16,
    timestamp: DateTime<Local>,
    services: BTreeSet<String>,
    location: Option<Location>,
}

impl DeviceObservation {
    /// Build an observation stamped with the current time.
    ///
    /// A missing or blank name becomes [`UNKNOWN_NAME`], a missing RSSI
    /// becomes [`MISSING_RSSI`]. Service identifiers are lowercased.
    pub fn new<S>(address: impl Into<String>, name: Option<&str>, rssi: Option<i16>, services: S) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_owned(),
            _ => UNKNOWN_NAME.to_owned(),
        };
        Self {
            address: address.into(),
            name,
            rssi: rssi.unwrap_or(MISSING_RSSI),
            timestamp: Local::now(),
            services: services
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            location: None,
        }
    }

    /// Replace the observation time.
    pub fn observed_at(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach (or clear) the position where the device was seen.
    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn services(&self) -> &BTreeSet<String> {
        &self.services
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }
}

/// A discovery mechanism.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Short label for logs ("bluez", "hcitool").
    fn name(&self) -> &'static str;

    /// Discover nearby devices for roughly `duration`.
    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceObservation>, ScanError>;
}

/// Adapter readiness plus backend selection and fallback.
pub struct Scanner {
    adapter: Box<dyn AdapterProbe>,
    primary: Option<Box<dyn ScanBackend>>,
    fallback: Box<dyn ScanBackend>,
}

impl Scanner {
    /// Build a scanner with an explicit backend selection.
    pub fn new(
        adapter: Box<dyn AdapterProbe>,
        primary: Option<Box<dyn ScanBackend>>,
        fallback: Box<dyn ScanBackend>,
    ) -> Self {
        Self {
            adapter,
            primary,
            fallback,
        }
    }

    /// Probe the platform stack once and build a scanner around the result.
    ///
    /// The primary backend is only selected if it initializes now; otherwise
    /// every scan in this process goes to `fallback`.
    pub async fn detect(
        adapter: Box<dyn AdapterProbe>,
        fallback: Box<dyn ScanBackend>,
        interface: &str,
    ) -> Self {
        #[cfg(feature = "btleplug")]
        let primary = match bluez::BluezBackend::detect(interface).await {
            Ok(backend) => {
                log::info!("Platform BLE scanner initialized for {interface}");
                Some(Box::new(backend) as Box<dyn ScanBackend>)
            }
            Err(e) => {
                log::warn!("Platform BLE scanner unavailable ({e}), using {} fallback", fallback.name());
                None
            }
        };
        #[cfg(not(feature = "btleplug"))]
        let primary: Option<Box<dyn ScanBackend>> = {
            log::info!(
                "Built without platform BLE support, using {} for {interface}",
                fallback.name()
            );
            None
        };

        Self::new(adapter, primary, fallback)
    }

    /// Name of the backend that serves scans when nothing fails.
    pub fn active_backend(&self) -> &'static str {
        self.primary
            .as_ref()
            .map_or_else(|| self.fallback.name(), |p| p.name())
    }

    /// Run one scan. Never fails: adapter problems degrade to a best-effort
    /// scan, backend failures to the fallback or to an empty result.
    pub async fn scan(&self, duration: Duration) -> Vec<DeviceObservation> {
        log::info!(
            "Scanning for {}s via {}",
            duration.as_secs(),
            self.active_backend()
        );

        if !self.adapter.ready().await {
            log::warn!("Adapter not ready, scanning best-effort");
        }

        let devices = match &self.primary {
            Some(primary) => match primary.scan(duration).await {
                Ok(devices) => devices,
                Err(e) => {
                    log::warn!(
                        "{} scan failed: {e}; retrying with {}",
                        primary.name(),
                        self.fallback.name()
                    );
                    self.scan_fallback(duration).await
                }
            },
            None => self.scan_fallback(duration).await,
        };

        log::info!("Scan complete: {} device(s) seen", devices.len());
        devices
    }

    async fn scan_fallback(&self, duration: Duration) -> Vec<DeviceObservation> {
        match self.fallback.scan(duration).await {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("{} scan failed: {e}", self.fallback.name());
                Vec::new()
            }
        }
    }
}
