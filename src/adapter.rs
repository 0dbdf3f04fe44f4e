/// Bluetooth adapter readiness.
///
/// Before every scan the engine makes sure the BlueZ service is running and
/// the HCI interface is up and discoverable. Every step is best-effort:
/// failures are logged and collapse into a `false` readiness result, never
/// an error, so the caller can still attempt a degraded scan.
use std::time::Duration;

use async_trait::async_trait;

use crate::host::{CommandRunner, Privilege};

/// Name of the system service that owns the Bluetooth stack.
pub const BLUETOOTH_SERVICE: &str = "bluetooth";

/// Delay before re-checking the service after the alternate start strategy.
pub const SERVICE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Readiness probe consumed by the scanner before each scan.
#[async_trait]
pub trait AdapterProbe: Send + Sync {
    /// Idempotent; returns true only when the adapter is powered and running.
    async fn ready(&self) -> bool;
}

/// Interface flags reported by `hciconfig <iface>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterFlags {
    /// `UP` — interface powered.
    pub up: bool,
    /// `RUNNING` — controller running.
    pub running: bool,
    /// `PSCAN`/`ISCAN` — page or inquiry scan enabled (discoverable).
    pub discoverable: bool,
}

impl AdapterFlags {
    /// Parse the flag line of `hciconfig` output, e.g. `UP RUNNING PSCAN ISCAN`.
    pub fn parse(output: &str) -> Self {
        let mut flags = Self::default();
        for token in output.split_whitespace() {
            match token {
                "UP" => flags.up = true,
                "RUNNING" => flags.running = true,
                "PSCAN" | "ISCAN" => flags.discoverable = true,
                _ => {}
            }
        }
        flags
    }

    pub fn is_ready(&self) -> bool {
        self.up && self.running
    }
}

/// Brings the Bluetooth service and HCI interface into a scan-capable state.
pub struct AdapterManager<R> {
    runner: R,
    interface: String,
    privilege: Privilege,
    retry_delay: Duration,
}

impl<R: CommandRunner> AdapterManager<R> {
    pub fn new(runner: R, interface: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            runner,
            interface: interface.into(),
            privilege: Privilege { use_sudo },
            retry_delay: SERVICE_RETRY_DELAY,
        }
    }

    /// Override the pause between start strategies.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Check whether the Bluetooth service is active.
    ///
    /// Asks systemd first; if `systemctl` is unavailable, falls back to the
    /// SysV `service` status output.
    pub async fn service_active(&self) -> bool {
        match self
            .runner
            .run("systemctl", &["is-active", BLUETOOTH_SERVICE])
            .await
        {
            Ok(out) => out.stdout.trim() == "active",
            Err(e) => {
                log::debug!("systemctl unavailable ({e}), trying service status");
                match self
                    .runner
                    .run("service", &[BLUETOOTH_SERVICE, "status"])
                    .await
                {
                    Ok(out) => out.stdout.to_lowercase().contains("running"),
                    Err(_) => false,
                }
            }
        }
    }

    /// Start the Bluetooth service, returning whether it is confirmed active.
    pub async fn start_service(&self) -> bool {
        let (program, args) = self
            .privilege
            .command("systemctl", &["start", BLUETOOTH_SERVICE]);
        if let Err(e) = self.runner.run(program, &args).await {
            log::warn!("systemctl start failed: {e}");
        }
        if self.service_active().await {
            log::info!("Bluetooth service started");
            return true;
        }

        let (program, args) = self
            .privilege
            .command("service", &[BLUETOOTH_SERVICE, "start"]);
        if let Err(e) = self.runner.run(program, &args).await {
            log::warn!("service start failed: {e}");
        }
        tokio::time::sleep(self.retry_delay).await;

        let active = self.service_active().await;
        if active {
            log::info!("Bluetooth service started (service fallback)");
        } else {
            log::warn!("Bluetooth service could not be started");
        }
        active
    }

    /// Query the interface flags without changing anything.
    pub async fn flags(&self) -> Option<AdapterFlags> {
        match self.runner.run("hciconfig", &[&self.interface]).await {
            Ok(out) => Some(AdapterFlags::parse(&out.stdout)),
            Err(e) => {
                log::warn!("could not query adapter {}: {e}", self.interface);
                None
            }
        }
    }

    async fn hciconfig(&self, mode: &str) {
        let (program, args) = self
            .privilege
            .command("hciconfig", &[&self.interface, mode]);
        match self.runner.run(program, &args).await {
            Ok(out) if !out.success => {
                log::debug!("hciconfig {} {mode}: {}", self.interface, out.stderr.trim())
            }
            Ok(_) => {}
            Err(e) => log::warn!("hciconfig {} {mode} failed: {e}", self.interface),
        }
    }
}

#[async_trait]
impl<R: CommandRunner> AdapterProbe for AdapterManager<R> {
    async fn ready(&self) -> bool {
        if !self.service_active().await {
            log::warn!("Bluetooth service not running, attempting to start");
            if !self.start_service().await {
                return false;
            }
        }

        self.hciconfig("up").await;
        self.hciconfig("piscan").await;

        match self.flags().await {
            Some(flags) if flags.is_ready() => {
                log::info!("Adapter {} ready", self.interface);
                true
            }
            Some(flags) => {
                log::warn!("Adapter {} not ready: {flags:?}", self.interface);
                false
            }
            None => false,
        }
    }
}
