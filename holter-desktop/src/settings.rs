//! Application settings

use std::path::PathBuf;

use egui::Ui;
use holter_sim::VirtualRecorderConfig;
use serde::{Deserialize, Serialize};

use crate::waveform;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Send a `read` automatically once a device connects
    pub auto_sync_on_connect: bool,
    /// Samples kept on the waveform display
    pub waveform_points: usize,
    /// Peripheral id of the last recorder we connected to
    #[serde(default)]
    pub last_device: Option<String>,
    /// Virtual recorder used when no hardware is around
    #[serde(default)]
    pub virtual_recorder: VirtualRecorderConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_sync_on_connect: true,
            waveform_points: waveform::DEFAULT_CAPACITY,
            last_device: None,
            virtual_recorder: VirtualRecorderConfig::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for holterlink
    /// Uses $XDG_CONFIG_HOME/holterlink, falls back to ~/.config/holterlink
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("holterlink"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("holterlink"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path =
            Self::settings_path().ok_or_else(|| "Could not determine settings path".to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(&path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }

    /// Check if settings have changed and auto-save if so
    /// Returns any error message for display
    fn auto_save_if_changed(&self, previous: &Settings) -> Option<String> {
        if self != previous {
            if let Err(e) = self.save() {
                return Some(e);
            }
        }
        None
    }

    /// Draw settings UI (auto-saves on change)
    /// Returns an error message if save failed
    pub fn draw(&mut self, ui: &mut Ui) -> Option<String> {
        let previous = self.clone();

        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([10.0, 8.0])
            .show(ui, |ui| {
                ui.label("Sync on connect:");
                ui.checkbox(&mut self.auto_sync_on_connect, "");
                ui.end_row();

                ui.label("Waveform points:");
                ui.add(egui::DragValue::new(&mut self.waveform_points).range(50..=2000));
                ui.end_row();

                ui.label("Virtual recorder rate (Hz):");
                ui.add(
                    egui::DragValue::new(&mut self.virtual_recorder.sample_rate_hz)
                        .range(50..=1000),
                );
                ui.end_row();
            });

        ui.add_space(16.0);

        // Show config file location
        if let Some(path) = Self::settings_path() {
            ui.label(
                egui::RichText::new(format!("Config: {}", path.display()))
                    .small()
                    .color(egui::Color32::GRAY),
            );
        }

        // Auto-save when settings change
        self.auto_save_if_changed(&previous)
    }
}
