//! Device connection: scan, connect, acquire, disconnect
//!
//! [`DeviceConnection`] is the host-facing entry point. It owns the driver, tracks
//! the connection lifecycle and creates one [`AcquisitionSession`] per connected
//! device. Driver calls that may block on radio or USB I/O run on tokio's blocking
//! pool; polling for packages stays synchronous so it can be called from a frame
//! loop.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use biostream::{DeviceConnection, ManagerConfig, ScanDomain, SimulatedDriver};
//!
//! # async fn example() -> biostream::Result<()> {
//! let connection = DeviceConnection::new(Arc::new(SimulatedDriver::default()), ManagerConfig::default())?;
//! let devices = connection.scan(&ScanDomain::ALL).await?;
//! connection.connect(devices[0].clone()).await?;
//!
//! connection
//!     .start_acquisition(biostream::AcquisitionConfig::ChannelCount {
//!         sampling_rate: 500,
//!         count: 4,
//!         resolution: 16,
//!     })
//!     .await?;
//!
//! if let Some(packages) = connection.get_package_of_data(true)? {
//!     println!("{} packages", packages.len());
//! }
//!
//! connection.stop_acquisition(true).await?;
//! connection.disconnect().await;
//! # Ok(())
//! # }
//! ```


use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::buffer::BufferStats;
use crate::config::ManagerConfig;
use crate::device::DeviceDriver;
use crate::session::AcquisitionSession;
use crate::stream::PackagePoller;
use crate::types::{
    AcquisitionConfig, ConnectionState, DeviceAddress, DeviceEvent, DeviceInfo, SamplePackage,
    ScanDomain, SessionState, StopOutcome,
};
use crate::{AcquisitionError, Result};

/// Run a blocking driver call on tokio's blocking pool
async fn blocking<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call).await.map_err(|e| {
        AcquisitionError::driver_with_source(operation, "blocking task failed", Box::new(e))
    })?
}

#[derive(Default)]
struct Link {
    address: Option<DeviceAddress>,
    session: Option<Arc<AcquisitionSession>>,
}

/// Connection to one acquisition device
pub struct DeviceConnection {
    driver: Arc<dyn DeviceDriver>,
    config: ManagerConfig,

    /// Serializes lifecycle operations
    ops: AsyncMutex<()>,

    link: parking_lot::Mutex<Link>,
    state: watch::Sender<ConnectionState>,
}

impl DeviceConnection {
    pub fn new(driver: Arc<dyn DeviceDriver>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            driver,
            config,
            ops: AsyncMutex::new(()),
            link: parking_lot::Mutex::new(Link::default()),
            state,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Connection state transitions, starting with the current state
    pub fn state_updates(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state.subscribe())
    }

    pub fn address(&self) -> Option<DeviceAddress> {
        self.link.lock().address.clone()
    }

    fn session(&self) -> Option<Arc<AcquisitionSession>> {
        self.link.lock().session.clone()
    }

    fn require_session(&self, operation: &str) -> Result<Arc<AcquisitionSession>> {
        self.session()
            .ok_or_else(|| AcquisitionError::precondition(operation, "no device connected"))
    }

    /// Discover devices on the given transports
    ///
    /// A transport that fails to scan is logged and skipped; the others still
    /// contribute. Duplicate identifiers are reported once.
    pub async fn scan(&self, domains: &[ScanDomain]) -> Result<Vec<DeviceAddress>> {
        let _guard = self.ops.lock().await;

        let previous = self.state();
        if !matches!(previous, ConnectionState::Disconnected | ConnectionState::Connected) {
            return Err(AcquisitionError::precondition("scan", format!("connection is {:?}", previous)));
        }
        self.state.send_replace(ConnectionState::Scanning);

        let mut found: Vec<DeviceAddress> = Vec::new();
        for &domain in domains {
            let driver = Arc::clone(&self.driver);
            match blocking("scan", move || driver.scan(domain)).await {
                Ok(devices) => {
                    debug!(%domain, count = devices.len(), "Scan finished");
                    for raw in devices {
                        let address = DeviceAddress::parse(raw);
                        if !found.contains(&address) {
                            found.push(address);
                        }
                    }
                }
                Err(e) => warn!(%domain, "Scan failed, skipping domain: {}", e),
            }
        }

        self.state.send_replace(previous);
        info!(count = found.len(), "Device scan complete");
        Ok(found)
    }

    /// Establish the link to `address`
    ///
    /// On failure or timeout the connection is left disconnected. A driver call
    /// that outlives the timeout is torn down in the background once it returns.
    pub async fn connect(&self, address: impl Into<DeviceAddress>) -> Result<()> {
        let address = address.into();
        let _guard = self.ops.lock().await;

        let current = self.state();
        if current != ConnectionState::Disconnected {
            return Err(AcquisitionError::precondition(
                format!("connect to {}", address),
                format!("connection is {:?}", current),
            ));
        }
        self.state.send_replace(ConnectionState::Connecting);
        info!(%address, "Connecting");

        let driver = Arc::clone(&self.driver);
        let raw = address.raw().to_string();
        let mut attempt = tokio::task::spawn_blocking(move || driver.connect(&raw));

        let joined = match self.config.connect_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut attempt).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.abandon_connect(attempt);
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!(%address, "Connection attempt timed out after {:?}", limit);
                    return Err(AcquisitionError::timeout(format!("connect to {}", address), limit));
                }
            },
            None => attempt.await,
        };

        let result = joined
            .map_err(|e| {
                AcquisitionError::driver_with_source("connect", "blocking task failed", Box::new(e))
            })
            .and_then(|result| result);
        if let Err(e) = result {
            self.state.send_replace(ConnectionState::Disconnected);
            warn!(%address, "Connection failed: {}", e);
            return Err(e);
        }

        let session = Arc::new(AcquisitionSession::new(Arc::clone(&self.driver), &self.config));
        *self.link.lock() = Link { address: Some(address.clone()), session: Some(session) };
        self.state.send_replace(ConnectionState::Connected);
        info!(%address, "Connected");
        Ok(())
    }

    fn abandon_connect(&self, attempt: tokio::task::JoinHandle<Result<()>>) {
        let driver = Arc::clone(&self.driver);
        tokio::spawn(async move {
            if let Ok(Ok(())) = attempt.await {
                debug!("Late connection completed, disconnecting");
                let teardown = tokio::task::spawn_blocking(move || driver.disconnect()).await;
                if !matches!(teardown, Ok(Ok(()))) {
                    warn!("Failed to tear down late connection");
                }
            }
        });
    }

    /// Drop the link, stopping any running acquisition first
    ///
    /// Always ends disconnected. Safe to call when nothing is connected; driver
    /// errors during teardown are logged, not returned.
    pub async fn disconnect(&self) {
        self.teardown(true).await;
    }

    /// Force-stop any running acquisition, then drop the link
    ///
    /// For terminal faults, where the driver cannot be trusted to acknowledge an
    /// interrupt.
    pub async fn force_disconnect(&self) {
        self.teardown(false).await;
    }

    async fn teardown(&self, voluntary: bool) {
        let _guard = self.ops.lock().await;

        if self.state() == ConnectionState::Disconnected {
            debug!("Disconnect requested with no device connected");
            return;
        }
        self.state.send_replace(ConnectionState::Disconnecting);

        let link = std::mem::take(&mut *self.link.lock());
        if let Some(session) = link.session {
            if session.state() != SessionState::Idle {
                match blocking("stop acquisition", move || Ok(session.stop(voluntary))).await {
                    Ok(outcome) => debug!(?outcome, "Acquisition stopped for disconnect"),
                    Err(e) => warn!("Failed to stop acquisition before disconnect: {}", e),
                }
            }
        }

        let driver = Arc::clone(&self.driver);
        if let Err(e) = blocking("disconnect", move || driver.disconnect()).await {
            warn!("Driver disconnect failed: {}", e);
        }

        self.state.send_replace(ConnectionState::Disconnected);
        match link.address {
            Some(address) => info!(%address, "Disconnected"),
            None => info!("Disconnected"),
        }
    }

    /// Begin acquiring with `config`
    pub async fn start_acquisition(&self, config: AcquisitionConfig) -> Result<()> {
        let _guard = self.ops.lock().await;

        let current = self.state();
        if current != ConnectionState::Connected {
            return Err(AcquisitionError::precondition(
                "start acquisition",
                format!("connection is {:?}", current),
            ));
        }
        let session = self.require_session("start acquisition")?;

        blocking("start acquisition", move || session.start(config)).await?;
        self.state.send_replace(ConnectionState::Acquiring);
        Ok(())
    }

    /// Begin acquiring with the profile from the configuration
    pub async fn start_default_acquisition(&self) -> Result<()> {
        let config = self.config.acquisition.clone().ok_or_else(|| {
            AcquisitionError::invalid_config("no default acquisition profile configured")
        })?;
        self.start_acquisition(config).await
    }

    /// Stop the running acquisition; see [`AcquisitionSession::stop`]
    pub async fn stop_acquisition(&self, voluntary: bool) -> Result<StopOutcome> {
        let _guard = self.ops.lock().await;

        let Some(session) = self.session() else {
            return Ok(StopOutcome::AlreadyStopped);
        };
        let outcome = blocking("stop acquisition", move || Ok(session.stop(voluntary))).await?;

        if self.state() == ConnectionState::Acquiring {
            self.state.send_replace(ConnectionState::Connected);
        }
        Ok(outcome)
    }

    /// Take the packages received since the last reset
    ///
    /// See [`AcquisitionSession::get_package_of_data`]. Fails with a precondition
    /// error when no device is connected.
    pub fn get_package_of_data(&self, reset_after: bool) -> Result<Option<Vec<SamplePackage>>> {
        self.require_session("poll packages")?.get_package_of_data(reset_after)
    }

    /// Poll the current session every `period`
    pub fn package_stream(&self, period: Duration) -> Result<PackagePoller> {
        Ok(PackagePoller::new(self.require_session("stream packages")?, period))
    }

    pub fn subscribe_events(&self) -> Result<broadcast::Receiver<DeviceEvent>> {
        Ok(self.require_session("subscribe to events")?.subscribe_events())
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session().map(|session| session.state())
    }

    pub fn active_config(&self) -> Option<AcquisitionConfig> {
        self.session().and_then(|session| session.active_config())
    }

    pub fn buffer_stats(&self) -> Option<BufferStats> {
        self.session().map(|session| session.buffer_stats())
    }

    /// Device type, product id, battery level and channel count
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        self.require_session("read device info")?;
        let driver = Arc::clone(&self.driver);
        blocking("device info", move || driver.device_info()).await
    }

    /// Write a sensor or system parameter; `port` 0 addresses the device itself
    pub async fn set_parameter(&self, port: u8, index: u8, data: Vec<i32>) -> Result<()> {
        let _guard = self.ops.lock().await;
        self.require_session("set parameter")?;

        let driver = Arc::clone(&self.driver);
        blocking("set parameter", move || driver.set_parameter(port, index, &data)).await?;
        debug!(port, index, "Parameter written");
        Ok(())
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        if let Some(session) = self.link.get_mut().session.take() {
            debug!("Dropping device connection");
            if session.state() != SessionState::Idle {
                session.stop(false);
            }
        }
    }
}
