//! Main application state and UI
//!
//! `HolterApp` owns the tokio runtime and the channels to whichever link
//! task is currently running. Each frame drains pending link events into
//! local state, then draws the dashboard: connection controls, live
//! waveform, and the stored-session list.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use eframe::CreationContext;
use egui::{Align, Align2, Color32, Layout, RichText, Ui};
use holter_protocol::{DeviceEvent, RecorderCommand, SessionEntry};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{info, warn};

use crate::link::{
    spawn_ble_link, spawn_scan, spawn_virtual_link, DiscoveredDevice, LinkCommand, LinkEvent,
};
use crate::settings::Settings;
use crate::waveform::WaveformBuffer;

/// How long a status message stays visible
const STATUS_TIMEOUT: Duration = Duration::from_secs(6);

/// Connection lifecycle as the UI sees it
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { name: String },
}

/// Payload lines collected between bulk transfer markers
#[derive(Default)]
struct TransferCapture {
    lines: Vec<String>,
    active: bool,
}

/// Main application state
pub struct HolterApp {
    /// Settings
    settings: Settings,
    /// Show settings panel
    show_settings: bool,
    /// Link event receiver (UI side)
    event_rx: Receiver<LinkEvent>,
    /// Link event sender (for cloning into spawned tasks)
    event_tx: Sender<LinkEvent>,
    /// Command sender for the active link task
    link_tx: Option<tokio_mpsc::Sender<LinkCommand>>,
    /// Connection lifecycle
    connection: ConnectionState,
    /// Peripherals seen by the last scan
    discovered: Vec<DiscoveredDevice>,
    /// Is a scan running
    scanning: bool,
    /// Live waveform samples
    waveform: WaveformBuffer,
    /// Most recent ADC reading
    last_sample: Option<i32>,
    /// Reported sampling frequency
    sample_rate: Option<String>,
    /// Has a live sample arrived on this connection
    live_active: bool,
    /// Stored sessions, newest first
    sessions: Vec<SessionEntry>,
    /// Overlay text while the device is busy (erase / bulk download)
    busy: Option<String>,
    /// Capture of the current/last bulk transfer payload
    transfer: TransferCapture,
    /// Erase confirmation dialog is open
    confirm_erase: bool,
    /// Status message
    status_message: Option<(String, Instant)>,
    /// Tokio runtime handle for spawning link tasks
    rt_handle: tokio::runtime::Handle,
    /// Tokio runtime (must be kept alive for async tasks)
    _runtime: tokio::runtime::Runtime,
}

impl HolterApp {
    /// Create a new application
    pub fn new(_cc: &CreationContext<'_>, runtime: tokio::runtime::Runtime) -> Self {
        let rt_handle = runtime.handle().clone();
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let settings = Settings::load();

        Self {
            waveform: WaveformBuffer::new(settings.waveform_points),
            settings,
            show_settings: false,
            event_rx,
            event_tx,
            link_tx: None,
            connection: ConnectionState::Disconnected,
            discovered: Vec::new(),
            scanning: false,
            last_sample: None,
            sample_rate: None,
            live_active: false,
            sessions: Vec::new(),
            busy: None,
            transfer: TransferCapture::default(),
            confirm_erase: false,
            status_message: None,
            rt_handle,
            _runtime: runtime,
        }
    }

    /// Show a transient status message
    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.status_message = Some((message, Instant::now()));
    }

    /// Send a directive over the active link
    fn send_command(&mut self, command: RecorderCommand) {
        let Some(tx) = &self.link_tx else {
            return;
        };
        if let Err(e) = tx.try_send(LinkCommand::Send(command)) {
            warn!("Failed to queue directive: {}", e);
            self.set_status("Command dropped: link busy or gone");
        }
    }

    /// Start a discovery scan
    fn start_scan(&mut self) {
        self.discovered.clear();
        self.scanning = true;
        spawn_scan(&self.rt_handle, self.event_tx.clone());
    }

    /// Connect to a scanned peripheral
    fn connect(&mut self, device_id: String) {
        self.connection = ConnectionState::Connecting;
        self.settings.last_device = Some(device_id.clone());
        let _ = self.settings.save();
        self.link_tx = Some(spawn_ble_link(
            &self.rt_handle,
            device_id,
            self.event_tx.clone(),
        ));
    }

    /// Connect to the built-in virtual recorder
    fn connect_virtual(&mut self) {
        self.connection = ConnectionState::Connecting;
        self.link_tx = Some(spawn_virtual_link(
            &self.rt_handle,
            self.settings.virtual_recorder.clone(),
            self.event_tx.clone(),
        ));
    }

    /// Close the active link
    fn disconnect(&mut self) {
        if let Some(tx) = &self.link_tx {
            let _ = tx.try_send(LinkCommand::Shutdown);
        }
    }

    /// Clear the session list and request a fresh listing
    fn sync_sessions(&mut self) {
        self.sessions.clear();
        self.send_command(RecorderCommand::ListSessions);
    }

    /// Process pending link events
    fn process_link_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                LinkEvent::DeviceDiscovered(device) => {
                    // UART-capable devices sort to the top of the list
                    let at = if device.has_uart {
                        self.discovered
                            .iter()
                            .position(|d| !d.has_uart)
                            .unwrap_or(self.discovered.len())
                    } else {
                        self.discovered.len()
                    };
                    self.discovered.insert(at, device);
                }
                LinkEvent::ScanFinished => {
                    self.scanning = false;
                }
                LinkEvent::Connected { name } => {
                    self.set_status(format!("Connected to {name}"));
                    self.connection = ConnectionState::Connected { name };
                    if self.settings.auto_sync_on_connect {
                        self.sync_sessions();
                    }
                }
                LinkEvent::Disconnected => {
                    self.link_tx = None;
                    self.connection = ConnectionState::Disconnected;
                    self.live_active = false;
                    self.busy = None;
                    self.sessions.clear();
                    self.set_status("Device disconnected");
                }
                LinkEvent::Device(event) => self.process_device_event(event),
                LinkEvent::Error(message) => {
                    self.set_status(message);
                }
            }
        }
    }

    /// Apply one decoded recorder event to the UI state
    fn process_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::LiveSample { value } => {
                self.waveform.push(value);
                self.last_sample = Some(value);
                self.live_active = true;
            }
            DeviceEvent::SampleRateReport { hz } => {
                self.sample_rate = Some(hz);
            }
            DeviceEvent::SessionEntry(entry) => {
                if !self.sessions.iter().any(|s| s.id == entry.id) {
                    self.sessions.insert(0, entry);
                }
            }
            DeviceEvent::EraseComplete => {
                self.busy = None;
                self.set_status("Flash memory wiped");
                self.sync_sessions();
            }
            DeviceEvent::BulkTransferStart => {
                self.busy = Some("Downloading all sessions...".to_string());
                self.transfer = TransferCapture {
                    lines: Vec::new(),
                    active: true,
                };
            }
            DeviceEvent::BulkTransferEnd => {
                self.busy = None;
                self.transfer.active = false;
                self.set_status(format!(
                    "Download complete ({} lines captured)",
                    self.transfer.lines.len()
                ));
            }
            DeviceEvent::Unrecognized { raw } => {
                // Bulk payload travels as free-form lines between the markers
                if self.transfer.active {
                    self.transfer.lines.push(raw);
                }
            }
        }
    }

    /// Write the last captured transfer to disk
    fn save_transfer(&mut self) {
        let dir = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = dir.join("holter-transfer.txt");

        let mut contents = self.transfer.lines.join("\n");
        contents.push('\n');

        match std::fs::write(&path, contents) {
            Ok(()) => self.set_status(format!("Saved transfer to {}", path.display())),
            Err(e) => self.set_status(format!("Save failed: {e}")),
        }
    }

    /// Draw the toolbar: title, connection controls, status
    fn draw_toolbar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.heading("HolterLink");
            ui.separator();

            match self.connection.clone() {
                ConnectionState::Connected { name } => {
                    ui.label(RichText::new(format!("Connected: {name}")).color(Color32::GREEN));
                    if ui.button("Disconnect").clicked() {
                        self.disconnect();
                    }
                }
                ConnectionState::Connecting => {
                    ui.spinner();
                    ui.label("Connecting...");
                }
                ConnectionState::Disconnected => {
                    ui.label(RichText::new("Disconnected").color(Color32::GRAY));

                    if self.scanning {
                        ui.spinner();
                        ui.label("Scanning...");
                    } else if ui.button("Scan").clicked() {
                        self.start_scan();
                    }

                    if ui.button("Virtual recorder").clicked() {
                        self.connect_virtual();
                    }
                }
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if ui.button("Settings").clicked() {
                    self.show_settings = !self.show_settings;
                }
                ui.separator();
                if let Some((message, _)) = &self.status_message {
                    ui.label(message);
                }
            });
        });
    }

    /// Draw the scanned-device list (only while disconnected)
    fn draw_device_list(&mut self, ui: &mut Ui) {
        if self.discovered.is_empty() {
            if !self.scanning {
                ui.label(
                    RichText::new("No devices found. Scan to discover recorders.")
                        .color(Color32::GRAY),
                );
            }
            return;
        }

        let mut connect_to = None;
        for device in &self.discovered {
            ui.horizontal(|ui| {
                let label = match device.rssi {
                    Some(rssi) => format!("{} ({} dBm)", device.name, rssi),
                    None => device.name.clone(),
                };
                if device.has_uart {
                    ui.label(RichText::new(&label).strong());
                } else {
                    ui.label(RichText::new(&label).color(Color32::GRAY));
                }
                if self.settings.last_device.as_deref() == Some(device.id.as_str()) {
                    ui.label(RichText::new("(last used)").small().color(Color32::GRAY));
                }
                if ui.small_button("Connect").clicked() {
                    connect_to = Some(device.id.clone());
                }
            });
        }
        if let Some(id) = connect_to {
            self.connect(id);
        }
    }

    /// Draw the stored-session panel
    fn draw_session_panel(&mut self, ui: &mut Ui) {
        let connected = matches!(self.connection, ConnectionState::Connected { .. });

        ui.heading("Sessions");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            if ui
                .add_enabled(connected, egui::Button::new("Sync"))
                .clicked()
            {
                self.sync_sessions();
            }
            if ui
                .add_enabled(connected, egui::Button::new("Download all"))
                .clicked()
            {
                // Bulk read shares the listing directive over this link
                self.send_command(RecorderCommand::ListSessions);
            }
            if ui
                .add_enabled(connected, egui::Button::new("Erase"))
                .clicked()
            {
                self.confirm_erase = true;
            }
        });

        ui.separator();

        if self.sessions.is_empty() {
            let hint = if connected {
                "No recordings on device"
            } else {
                "Connect device to view sessions"
            };
            ui.label(RichText::new(hint).color(Color32::GRAY));
            return;
        }

        let mut export_id = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for entry in &self.sessions {
                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.label(RichText::new(format!("ECG SESSION #{}", entry.id)).strong());
                        ui.label(
                            RichText::new(format!("{} bytes | {}", entry.byte_count, entry.timestamp))
                                .small()
                                .color(Color32::GRAY),
                        );
                    });
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if ui.small_button("Export").clicked() {
                            if let Ok(id) = entry.id.parse::<u32>() {
                                export_id = Some(id);
                            }
                        }
                    });
                });
                ui.separator();
            }
        });

        if let Some(id) = export_id {
            self.send_command(RecorderCommand::ExportSession { id });
        }

        if !self.transfer.lines.is_empty() && !self.transfer.active {
            ui.add_space(4.0);
            if ui
                .button(format!("Save transfer ({} lines)", self.transfer.lines.len()))
                .clicked()
            {
                self.save_transfer();
            }
        }
    }

    /// Draw the live statistics row above the waveform
    fn draw_live_stats(&self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if self.live_active {
                ui.label(RichText::new("LIVE").color(Color32::RED).strong());
                ui.separator();
            }
            match &self.sample_rate {
                Some(hz) => ui.label(format!("Rate: {hz} Hz")),
                None => ui.label(RichText::new("Rate: ---").color(Color32::GRAY)),
            };
            ui.separator();
            match self.last_sample {
                Some(value) => ui.label(format!("ADC: {value}")),
                None => ui.label(RichText::new("ADC: ---").color(Color32::GRAY)),
            };
        });
    }

    /// Draw the erase confirmation dialog
    fn draw_erase_confirm(&mut self, ctx: &egui::Context) {
        if !self.confirm_erase {
            return;
        }

        egui::Window::new("Erase flash")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("This will wipe all ECG recordings in flash memory.");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        self.confirm_erase = false;
                    }
                    if ui
                        .button(RichText::new("Erase everything").color(Color32::RED))
                        .clicked()
                    {
                        self.confirm_erase = false;
                        self.busy = Some("Wiping flash...".to_string());
                        self.send_command(RecorderCommand::EraseAll);
                    }
                });
            });
    }

    /// Draw the busy overlay while the device erases or exports
    fn draw_busy_overlay(&self, ctx: &egui::Context) {
        let Some(text) = &self.busy else {
            return;
        };

        egui::Window::new("busy_overlay")
            .title_bar(false)
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(RichText::new(text).strong());
                });
            });
    }
}

impl eframe::App for HolterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_link_events();

        // Expire stale status messages
        if let Some((_, shown_at)) = &self.status_message {
            if shown_at.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }

        // Apply settings the waveform depends on
        self.waveform.set_capacity(self.settings.waveform_points);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        egui::SidePanel::left("sessions")
            .default_width(260.0)
            .show(ctx, |ui| {
                self.draw_session_panel(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.connection == ConnectionState::Disconnected {
                self.draw_device_list(ui);
                ui.add_space(8.0);
            }
            self.draw_live_stats(ui);
            ui.add_space(4.0);
            self.waveform.draw(ui);
        });

        if self.show_settings {
            let mut open = true;
            let mut save_error = None;
            egui::Window::new("Settings")
                .open(&mut open)
                .resizable(false)
                .show(ctx, |ui| {
                    save_error = self.settings.draw(ui);
                });
            self.show_settings = open;
            if let Some(error) = save_error {
                self.set_status(error);
            }
        }

        self.draw_erase_confirm(ctx);
        self.draw_busy_overlay(ctx);

        // Keep the waveform moving while data can arrive
        if self.connection != ConnectionState::Disconnected || self.scanning {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}
