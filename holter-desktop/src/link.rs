//! Transport link to the recorder
//!
//! Each connection runs in its own spawned task on the tokio runtime,
//! feeding raw chunks through one `LineDecoder` and reporting decoded
//! events to the UI thread over a std mpsc channel. Commands flow the
//! other way over a tokio mpsc channel.
//!
//! Two transports share the same channel contract:
//! - **BLE**: the recorder's RN4871 module exposes a Transparent UART
//!   GATT service; device output arrives as notifications on the read
//!   characteristic, directives are written to the write characteristic.
//! - **Virtual**: a `holter_sim` recorder task wired up over an in-memory
//!   duplex stream, for running the dashboard without hardware.

use std::collections::HashSet;
use std::sync::mpsc::Sender;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use holter_protocol::{DeviceEvent, EncodeCommand, LineDecoder, RecorderCommand};
use holter_sim::{run_virtual_recorder_task, VirtualRecorder, VirtualRecorderConfig};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// RN4871 Transparent UART service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x49535452_6564_6c6f_6261_6c5365727669);
/// Transparent UART app-to-device characteristic
pub const UART_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x49535452_6564_6c6f_6261_6c536572766b);
/// Transparent UART device-to-app (notify) characteristic
pub const UART_NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x49535452_6564_6c6f_6261_6c536572766a);

/// How long a discovery scan runs before stopping itself
const SCAN_DURATION: Duration = Duration::from_secs(10);

/// Poll cadence for discovered peripherals during a scan
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from the BLE transport
#[derive(Debug, Error)]
pub enum LinkError {
    /// Underlying bluetooth stack error
    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No usable bluetooth adapter on this machine
    #[error("no bluetooth adapter found")]
    NoAdapter,

    /// The requested peripheral was not seen by the last scan
    #[error("device {0} not found; scan again")]
    DeviceNotFound(String),

    /// Connected device does not expose the Transparent UART service
    #[error("device does not expose the transparent UART service")]
    ServiceMissing,

    /// A required characteristic is absent
    #[error("characteristic {0} not found")]
    CharacteristicMissing(Uuid),
}

/// A peripheral seen during a discovery scan
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Advertised local name (falls back to the platform id)
    pub name: String,
    /// Platform-specific peripheral id, used to connect
    pub id: String,
    /// Signal strength at discovery time
    pub rssi: Option<i16>,
    /// Whether the advertisement carried the Transparent UART service
    pub has_uart: bool,
}

/// Messages from link tasks to the UI thread
#[derive(Debug)]
pub enum LinkEvent {
    /// A peripheral appeared during a scan
    DeviceDiscovered(DiscoveredDevice),
    /// The discovery scan stopped
    ScanFinished,
    /// The link is up and the decoder is running
    Connected { name: String },
    /// The link ended; terminal for this connection, no retry
    Disconnected,
    /// One decoded report from the recorder
    Device(DeviceEvent),
    /// A transport failure worth surfacing
    Error(String),
}

/// Commands that can be sent to a link task
#[derive(Debug)]
pub enum LinkCommand {
    /// Encode and transmit a directive
    Send(RecorderCommand),
    /// Close the link
    Shutdown,
}

/// Get the first bluetooth adapter
async fn default_adapter() -> Result<Adapter, LinkError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(LinkError::NoAdapter)
}

/// Find a GATT characteristic by UUID on a connected peripheral
fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
}

/// Spawn a discovery scan task
///
/// Discovered peripherals are reported as [`LinkEvent::DeviceDiscovered`];
/// the scan stops itself after [`SCAN_DURATION`] and always ends with
/// [`LinkEvent::ScanFinished`].
pub fn spawn_scan(rt: &tokio::runtime::Handle, events: Sender<LinkEvent>) {
    rt.spawn(async move {
        if let Err(e) = scan_for_recorders(&events).await {
            warn!("Scan failed: {}", e);
            let _ = events.send(LinkEvent::Error(format!("Scan failed: {e}")));
        }
        let _ = events.send(LinkEvent::ScanFinished);
    });
}

/// Run one discovery scan, polling the adapter for new peripherals
///
/// Scans without an OS-level service filter: some platforms only match
/// UUIDs in the primary advertisement packet, while the RN4871 places the
/// service UUID in the scan response. Devices are matched app-side instead.
async fn scan_for_recorders(events: &Sender<LinkEvent>) -> Result<(), LinkError> {
    let adapter = default_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    info!("BLE scan started");

    let mut seen = HashSet::new();
    let rounds = (SCAN_DURATION.as_millis() / SCAN_POLL_INTERVAL.as_millis()).max(1);

    for _ in 0..rounds {
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;

        for peripheral in adapter.peripherals().await? {
            let id = peripheral.id().to_string();
            if seen.contains(&id) {
                continue;
            }

            let Some(props) = peripheral.properties().await.ok().flatten() else {
                continue;
            };

            let has_uart = props.services.contains(&UART_SERVICE_UUID)
                || props.service_data.contains_key(&UART_SERVICE_UUID);

            // Unnamed peripherals are only worth listing if they carry
            // the UART service
            let name = match props.local_name {
                Some(name) => name,
                None if has_uart => id.clone(),
                None => continue,
            };

            seen.insert(id.clone());
            debug!("Discovered {} ({}), RSSI {:?}", name, id, props.rssi);

            let _ = events.send(LinkEvent::DeviceDiscovered(DiscoveredDevice {
                name,
                id,
                rssi: props.rssi,
                has_uart,
            }));
        }
    }

    adapter.stop_scan().await?;
    info!("BLE scan finished");
    Ok(())
}

/// Spawn a BLE link task for a previously discovered peripheral
pub fn spawn_ble_link(
    rt: &tokio::runtime::Handle,
    device_id: String,
    events: Sender<LinkEvent>,
) -> tokio_mpsc::Sender<LinkCommand> {
    let (cmd_tx, cmd_rx) = tokio_mpsc::channel(32);
    rt.spawn(run_ble_link(device_id, events, cmd_rx));
    cmd_tx
}

/// Connect to the recorder and run the link until it ends
///
/// Always finishes with [`LinkEvent::Disconnected`], whatever ended the
/// link; a transport disconnect is terminal for the session.
async fn run_ble_link(
    device_id: String,
    events: Sender<LinkEvent>,
    mut cmd_rx: tokio_mpsc::Receiver<LinkCommand>,
) {
    match connect_uart(&device_id).await {
        Ok((peripheral, write_char, name)) => {
            info!("Connected to {} ({})", name, device_id);
            let _ = events.send(LinkEvent::Connected { name });

            if let Err(e) = drive_ble_link(&peripheral, &write_char, &events, &mut cmd_rx).await {
                warn!("Link error on {}: {}", device_id, e);
                let _ = events.send(LinkEvent::Error(e.to_string()));
            }

            let _ = peripheral.disconnect().await;
        }
        Err(e) => {
            warn!("Connection to {} failed: {}", device_id, e);
            let _ = events.send(LinkEvent::Error(format!("Connection failed: {e}")));
        }
    }

    info!("Link ended for {}", device_id);
    let _ = events.send(LinkEvent::Disconnected);
}

/// Connect, verify the UART service, resolve characteristics, subscribe
async fn connect_uart(device_id: &str) -> Result<(Peripheral, Characteristic, String), LinkError> {
    let adapter = default_adapter().await?;

    let peripheral = adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|p| p.id().to_string() == device_id)
        .ok_or_else(|| LinkError::DeviceNotFound(device_id.to_string()))?;

    peripheral.connect().await?;
    peripheral.discover_services().await?;

    if !peripheral
        .services()
        .iter()
        .any(|s| s.uuid == UART_SERVICE_UUID)
    {
        let _ = peripheral.disconnect().await;
        return Err(LinkError::ServiceMissing);
    }

    let notify_char = find_characteristic(&peripheral, UART_NOTIFY_CHAR_UUID)
        .ok_or(LinkError::CharacteristicMissing(UART_NOTIFY_CHAR_UUID))?;
    let write_char = find_characteristic(&peripheral, UART_WRITE_CHAR_UUID)
        .ok_or(LinkError::CharacteristicMissing(UART_WRITE_CHAR_UUID))?;

    peripheral.subscribe(&notify_char).await?;

    let name = peripheral
        .properties()
        .await
        .ok()
        .flatten()
        .and_then(|p| p.local_name)
        .unwrap_or_else(|| device_id.to_string());

    Ok((peripheral, write_char, name))
}

/// Main link loop: notifications in, directives out, liveness watchdog
async fn drive_ble_link(
    peripheral: &Peripheral,
    write_char: &Characteristic,
    events: &Sender<LinkEvent>,
    cmd_rx: &mut tokio_mpsc::Receiver<LinkCommand>,
) -> Result<(), LinkError> {
    let mut notifications = peripheral.notifications().await?;
    let mut decoder = LineDecoder::new();
    let mut liveness = tokio::time::interval(Duration::from_secs(2));

    loop {
        tokio::select! {
            notification = notifications.next() => {
                match notification {
                    Some(n) if n.uuid == UART_NOTIFY_CHAR_UUID => {
                        for event in decoder.feed(&n.value) {
                            let _ = events.send(LinkEvent::Device(event));
                        }
                    }
                    Some(_) => {}
                    None => {
                        info!("Notification stream ended");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCommand::Send(command)) => {
                        debug!("Sending directive {:?}", command);
                        peripheral
                            .write(write_char, &command.encode(), WriteType::WithResponse)
                            .await?;
                    }
                    Some(LinkCommand::Shutdown) | None => {
                        info!("Shutdown requested for link");
                        break;
                    }
                }
            }

            _ = liveness.tick() => {
                if !peripheral.is_connected().await.unwrap_or(false) {
                    warn!("Peripheral dropped the connection");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Spawn a virtual recorder wired to the same link channel contract
///
/// The recorder task and the link pump run over an in-memory duplex
/// stream; dropping the returned command sender tears both down.
pub fn spawn_virtual_link(
    rt: &tokio::runtime::Handle,
    config: VirtualRecorderConfig,
    events: Sender<LinkEvent>,
) -> tokio_mpsc::Sender<LinkCommand> {
    let (cmd_tx, cmd_rx) = tokio_mpsc::channel(32);
    let (app_stream, recorder_stream) = tokio::io::duplex(4096);

    let recorder = VirtualRecorder::from_config(config);
    let name = recorder.id().to_string();

    // The recorder task shuts down when this sender is dropped by the
    // link pump on exit
    let (recorder_cmd_tx, recorder_cmd_rx) = tokio_mpsc::channel(8);
    rt.spawn(async move {
        if let Err(e) = run_virtual_recorder_task(recorder_stream, recorder, recorder_cmd_rx).await
        {
            warn!("Virtual recorder task failed: {}", e);
        }
    });

    rt.spawn(run_stream_link(
        app_stream,
        name,
        events,
        cmd_rx,
        recorder_cmd_tx,
    ));

    cmd_tx
}

/// Link pump over any byte stream: chunks in, decoded events out
async fn run_stream_link<S>(
    mut stream: S,
    name: String,
    events: Sender<LinkEvent>,
    mut cmd_rx: tokio_mpsc::Receiver<LinkCommand>,
    _recorder_cmd_tx: tokio_mpsc::Sender<holter_sim::VirtualRecorderCommand>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = events.send(LinkEvent::Connected { name });

    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        for event in decoder.feed(&buf[..n]) {
                            let _ = events.send(LinkEvent::Device(event));
                        }
                    }
                    Err(e) => {
                        let _ = events.send(LinkEvent::Error(format!("Link read error: {e}")));
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCommand::Send(command)) => {
                        if let Err(e) = stream.write_all(&command.encode()).await {
                            let _ = events.send(LinkEvent::Error(format!("Link write error: {e}")));
                            break;
                        }
                        let _ = stream.flush().await;
                    }
                    Some(LinkCommand::Shutdown) | None => break,
                }
            }
        }
    }

    let _ = events.send(LinkEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use holter_protocol::SessionEntry;
    use std::sync::mpsc;

    fn recv_event(rx: &mpsc::Receiver<LinkEvent>) -> LinkEvent {
        rx.recv_timeout(Duration::from_secs(2))
            .expect("timed out waiting for link event")
    }

    #[test]
    fn test_uart_uuids_match_module_datasheet() {
        assert_eq!(
            UART_SERVICE_UUID.to_string(),
            "49535452-6564-6c6f-6261-6c5365727669"
        );
        assert_eq!(
            UART_WRITE_CHAR_UUID.to_string(),
            "49535452-6564-6c6f-6261-6c536572766b"
        );
        assert_eq!(
            UART_NOTIFY_CHAR_UUID.to_string(),
            "49535452-6564-6c6f-6261-6c536572766a"
        );
    }

    #[test]
    fn test_virtual_link_round_trip() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (event_tx, event_rx) = mpsc::channel();

        let config = VirtualRecorderConfig {
            id: "Link Test".into(),
            sample_rate_hz: 250,
            sessions: vec![holter_sim::StoredSession {
                id: 3,
                byte_count: 512,
                timestamp: None,
            }],
        };
        let cmd_tx = spawn_virtual_link(runtime.handle(), config, event_tx);

        assert!(matches!(
            recv_event(&event_rx),
            LinkEvent::Connected { ref name } if name == "Link Test"
        ));

        cmd_tx
            .blocking_send(LinkCommand::Send(RecorderCommand::ListSessions))
            .unwrap();

        // Rate report, header, then the session entry
        let entry = loop {
            match recv_event(&event_rx) {
                LinkEvent::Device(DeviceEvent::SessionEntry(entry)) => break entry,
                LinkEvent::Device(_) => continue,
                other => panic!("unexpected link event: {other:?}"),
            }
        };
        assert_eq!(
            entry,
            SessionEntry {
                id: "3".into(),
                byte_count: "512".into(),
                timestamp: "N/A".into(),
            }
        );

        cmd_tx.blocking_send(LinkCommand::Shutdown).unwrap();
        loop {
            if matches!(recv_event(&event_rx), LinkEvent::Disconnected) {
                break;
            }
        }
    }
}
