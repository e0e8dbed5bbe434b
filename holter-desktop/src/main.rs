//! HolterLink Desktop Application
//!
//! A desktop dashboard for the wireless Holter ECG recorder: live
//! waveform display, stored-session listing and download, and flash
//! erase over the recorder's BLE transparent-UART link.

mod app;
mod link;
mod settings;
mod waveform;

use app::HolterApp;
use eframe::NativeOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> eframe::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "holterlink=info,holter_protocol=info,holter_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting HolterLink dashboard");

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([800.0, 560.0])
            .with_title("HolterLink - Wireless ECG Dashboard"),
        ..Default::default()
    };

    eframe::run_native(
        "HolterLink",
        options,
        Box::new(|cc| {
            // The runtime lives inside the app so link tasks survive as
            // long as the window does
            let runtime = tokio::runtime::Runtime::new()?;
            Ok(Box::new(HolterApp::new(cc, runtime)))
        }),
    )
}
