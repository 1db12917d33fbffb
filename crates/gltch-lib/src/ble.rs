//! BLE central for the companion: finding the controller and talking to its
//! command characteristic.
//!
//! btleplug is async; the rest of the companion is thread-based. A
//! [`BleCentral`] owns a multi-threaded tokio runtime and exposes blocking
//! calls on top of it. A connected [`BleLink`] is a [`FrameSink`] and can
//! forward controller notifications to a [`TriggerNotifier`].

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Notify;

use crate::companion::{TriggerNotifier, is_mute_request};
use crate::protocol::{COMMAND_CHAR_UUID, FRAME_LEN, SERVICE_UUID};
use crate::transport::{FrameSink, TransportError};

/// How often the peripheral list is re-read while looking for the controller.
const DISCOVERY_POLL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum BleError {
    /// The tokio runtime could not be started.
    Runtime(std::io::Error),
    NoAdapter,
    /// No peripheral advertising the given name within the scan window.
    NotFound(String),
    /// Connected, but the command characteristic is not exposed.
    CharacteristicMissing,
    Btle(btleplug::Error),
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::Runtime(e) => write!(f, "BLE runtime failed to start: {e}"),
            BleError::NoAdapter => write!(f, "No Bluetooth adapter found"),
            BleError::NotFound(name) => write!(f, "Controller \"{name}\" not found"),
            BleError::CharacteristicMissing => {
                write!(f, "Command characteristic {COMMAND_CHAR_UUID} not found")
            }
            BleError::Btle(e) => write!(f, "Bluetooth error: {e}"),
        }
    }
}

impl std::error::Error for BleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BleError::Runtime(e) => Some(e),
            BleError::Btle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<btleplug::Error> for BleError {
    fn from(e: btleplug::Error) -> Self {
        BleError::Btle(e)
    }
}

pub type Result<T> = std::result::Result<T, BleError>;

/// A peripheral seen during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertised name matches the configured controller name.
    pub is_controller: bool,
}

/// Blocking facade over the first Bluetooth adapter.
pub struct BleCentral {
    runtime: Runtime,
    adapter: Adapter,
}

impl BleCentral {
    pub fn open() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("ble")
            .build()
            .map_err(BleError::Runtime)?;
        let adapter = runtime.block_on(first_adapter())?;
        Ok(BleCentral { runtime, adapter })
    }

    /// Scan for `duration` and report every named or unnamed peripheral seen.
    pub fn scan(&self, duration: Duration, controller_name: &str) -> Result<Vec<DiscoveredDevice>> {
        self.runtime.block_on(async {
            self.adapter.start_scan(ScanFilter::default()).await?;
            tokio::time::sleep(duration).await;

            let mut devices = Vec::new();
            for peripheral in self.adapter.peripherals().await? {
                if let Some(props) = peripheral.properties().await? {
                    let name = props.local_name.unwrap_or_default();
                    devices.push(DiscoveredDevice {
                        is_controller: name == controller_name,
                        address: peripheral.address().to_string(),
                        rssi: props.rssi,
                        name,
                    });
                }
            }

            self.adapter.stop_scan().await?;
            rank_devices(&mut devices);
            Ok::<_, BleError>(devices)
        })
    }

    /// Discover the controller by advertised name, connect, and locate the
    /// command characteristic.
    pub fn connect(&self, name: &str, timeout: Duration) -> Result<BleLink> {
        let handle = self.runtime.handle().clone();
        let (peripheral, command, events) = self.runtime.block_on(async {
            let peripheral = find_peripheral(&self.adapter, name, timeout).await?;
            // Subscribed before connecting so an early drop is not missed.
            let events = self.adapter.events().await?;
            peripheral.connect().await?;
            peripheral.discover_services().await?;
            let command = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == COMMAND_CHAR_UUID && c.service_uuid == SERVICE_UUID)
                .ok_or(BleError::CharacteristicMissing)?;
            Ok::<_, BleError>((peripheral, command, events))
        })?;
        log::info!("[link] connected to {} ({})", name, peripheral.address());

        let connected = Arc::new(AtomicBool::new(true));
        self.runtime.spawn(watch_disconnect(
            events,
            peripheral.id(),
            Arc::clone(&connected),
        ));

        Ok(BleLink {
            handle,
            peripheral,
            command,
            connected,
        })
    }
}

/// Controller first, then strongest signal; unknown RSSI sorts last.
fn rank_devices(devices: &mut [DiscoveredDevice]) {
    devices.sort_by(|a, b| {
        b.is_controller
            .cmp(&a.is_controller)
            .then(b.rssi.cmp(&a.rssi))
    });
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

async fn find_peripheral(adapter: &Adapter, name: &str, timeout: Duration) -> Result<Peripheral> {
    adapter.start_scan(ScanFilter::default()).await?;
    let deadline = crate::companion::deadline_after(Instant::now(), timeout);
    let found = loop {
        if let Some(p) = named_peripheral(adapter, name).await? {
            break Some(p);
        }
        if Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(DISCOVERY_POLL).await;
    };
    adapter.stop_scan().await?;
    found.ok_or_else(|| BleError::NotFound(name.to_string()))
}

async fn named_peripheral(adapter: &Adapter, name: &str) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await?
            && props.local_name.as_deref() == Some(name)
        {
            log::debug!("[link] found {name} at {}", peripheral.address());
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

async fn watch_disconnect(mut events: EventStream, id: PeripheralId, connected: Arc<AtomicBool>) {
    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(gone) = event
            && gone == id
        {
            break;
        }
    }
    log::info!("[link] disconnected");
    connected.store(false, Ordering::SeqCst);
}

/// Forward mute requests from `stream` on a `ble-notify` thread.
///
/// `on_close` runs only if the stream itself ends.
fn spawn_forwarder<S>(
    handle: Handle,
    mut stream: S,
    notifier: TriggerNotifier,
    on_close: impl FnOnce() + Send + 'static,
) -> std::io::Result<TriggerForwarder>
where
    S: Stream<Item = ValueNotification> + Unpin + Send + 'static,
{
    let stop = Arc::new(Notify::new());
    let stop_rx = Arc::clone(&stop);
    let thread = std::thread::Builder::new()
        .name("ble-notify".into())
        .spawn(move || {
            loop {
                let next = handle.block_on(async {
                    tokio::select! {
                        n = stream.next() => Some(n),
                        _ = stop_rx.notified() => None,
                    }
                });
                let n = match next {
                    None => return,
                    Some(None) => break,
                    Some(Some(n)) => n,
                };
                if n.uuid != COMMAND_CHAR_UUID {
                    continue;
                }
                log::debug!("[link] notification: {:02X?}", n.value);
                if is_mute_request(&n.value) && !notifier.notify() {
                    return;
                }
            }
            log::debug!("[link] notification stream closed");
            on_close();
        })?;
    Ok(TriggerForwarder { stop, thread })
}

/// Running notification forwarder started by [`BleLink::forward_triggers`].
pub struct TriggerForwarder {
    stop: Arc<Notify>,
    thread: JoinHandle<()>,
}

impl TriggerForwarder {
    /// Stop forwarding and wait for the thread to exit.
    pub fn stop(self) {
        self.stop.notify_one();
        if self.thread.join().is_err() {
            log::warn!("[link] notification thread panicked");
        }
    }
}

/// Connected controller. Writes go to the command characteristic without
/// response.
pub struct BleLink {
    handle: Handle,
    peripheral: Peripheral,
    command: Characteristic,
    connected: Arc<AtomicBool>,
}

impl BleLink {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Shared flag cleared when the controller disconnects.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    /// Subscribe to notifications and hand each mute request to `notifier`.
    ///
    /// The forwarding thread ends when the notification stream closes, the
    /// companion loop stops receiving, or [`TriggerForwarder::stop`] is called.
    pub fn forward_triggers(&self, notifier: TriggerNotifier) -> Result<TriggerForwarder> {
        let mut stream = self.handle.block_on(async {
            self.peripheral.subscribe(&self.command).await?;
            self.peripheral.notifications().await
        })?;
        let connected = Arc::clone(&self.connected);
        spawn_forwarder(self.handle.clone(), stream, notifier, move || {
            connected.store(false, Ordering::SeqCst);
        })
        .map_err(BleError::Runtime)
    }

    pub fn disconnect(&self) {
        if let Err(e) = self.handle.block_on(self.peripheral.disconnect()) {
            log::debug!("[link] disconnect: {e}");
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl FrameSink for BleLink {
    fn send(&self, frame: [u8; FRAME_LEN]) -> std::result::Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        log::debug!("[link] write {frame:02X?}");
        self.handle
            .block_on(
                self.peripheral
                    .write(&self.command, &frame, WriteType::WithoutResponse),
            )
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }
}
