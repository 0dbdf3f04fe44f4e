//! Primary backend: timed discovery through the platform BLE stack.
//!
//! Uses btleplug, which talks to BlueZ over D-Bus on Linux. One scan is a
//! single discovery window of `duration`. Only peripherals that announce
//! themselves during the window are reported, and their properties are read
//! while discovery is still running because BlueZ drops RSSI once it stops.
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures_util::StreamExt;

use super::{DeviceObservation, ScanBackend};
use crate::error::ScanError;

impl From<btleplug::Error> for ScanError {
    fn from(e: btleplug::Error) -> Self {
        ScanError::Platform {
            reason: e.to_string(),
        }
    }
}

/// Map advertised properties to an observation. Missing name and RSSI fall
/// back to the observation defaults.
pub fn observation_from(props: &PeripheralProperties) -> DeviceObservation {
    DeviceObservation::new(
        props.address.to_string(),
        props.local_name.as_deref(),
        props.rssi,
        props.services.iter().map(|uuid| uuid.to_string()),
    )
}

/// Discovery on one platform adapter.
pub struct BluezBackend {
    adapter: Adapter,
}

impl BluezBackend {
    /// Connect to the platform stack and pick the adapter for `interface`
    /// (e.g. `hci0`), or the first adapter if none matches by name.
    pub async fn detect(interface: &str) -> Result<Self, ScanError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        let mut chosen = None;
        for adapter in &adapters {
            if let Ok(info) = adapter.adapter_info().await {
                if info.contains(interface) {
                    chosen = Some(adapter.clone());
                    break;
                }
            }
        }

        let adapter = chosen
            .or_else(|| adapters.into_iter().next())
            .ok_or(ScanError::NoAdapter)?;
        Ok(Self { adapter })
    }

    /// Read properties for the peripherals seen in this window. A device
    /// that vanished in the meantime is skipped.
    async fn observe(&self, seen: HashSet<PeripheralId>) -> Vec<DeviceObservation> {
        let mut devices = Vec::with_capacity(seen.len());
        for id in seen {
            let props = match self.adapter.peripheral(&id).await {
                Ok(peripheral) => peripheral.properties().await,
                Err(e) => Err(e),
            };
            match props {
                Ok(Some(props)) => devices.push(observation_from(&props)),
                Ok(None) => {}
                Err(e) => log::debug!("skipping {id:?}: {e}"),
            }
        }
        devices
    }
}

#[async_trait]
impl ScanBackend for BluezBackend {
    fn name(&self) -> &'static str {
        "bluez"
    }

    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceObservation>, ScanError> {
        // Subscribe first so no discovery event is missed.
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let mut seen = HashSet::new();
        let window = tokio::time::timeout(duration, async {
            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        seen.insert(id);
                    }
                    _ => {}
                }
            }
        })
        .await;
        if window.is_ok() {
            log::debug!("event stream closed before the scan window ended");
        }

        let devices = self.observe(seen).await;
        if let Err(e) = self.adapter.stop_scan().await {
            log::debug!("stop_scan failed: {e}");
        }
        Ok(devices)
    }
}
