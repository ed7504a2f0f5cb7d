//! `courier run`: WhatsApp source wired to the attachment relay.

use std::sync::Arc;

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    courier_channels::{ChannelEvent, ChannelEventHandler, EventKind, EventSource},
    courier_config::CourierConfig,
    courier_relay::AttachmentRelay,
    courier_whatsapp::WhatsAppSource,
    qrcode::{QrCode, render::unicode::Dense1x2},
    tracing::{info, warn},
};

/// Surfaces connection events to whoever runs the process.
struct OperatorNotices;

impl OperatorNotices {
    fn render(event: &ChannelEvent) -> Option<String> {
        match event {
            ChannelEvent::Qr { code, .. } => Some(format!(
                "Scan this QR code with WhatsApp (Linked devices > Link a device):\n{}",
                render_qr(code)
            )),
            ChannelEvent::Ready { phone_number, .. } => Some(match phone_number {
                Some(number) => format!("WhatsApp connected as +{number}"),
                None => "WhatsApp connected".to_string(),
            }),
            _ => None,
        }
    }
}

/// Draw `payload` as a terminal QR code with half-block characters, light on
/// dark so it scans from a dark terminal. Falls back to the raw payload when it
/// does not fit in a QR code.
fn render_qr(payload: &str) -> String {
    match QrCode::new(payload.as_bytes()) {
        Ok(code) => code
            .render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
        Err(e) => {
            warn!(error = %e, "pairing code cannot be drawn as a QR code");
            payload.to_string()
        },
    }
}

#[async_trait]
impl ChannelEventHandler for OperatorNotices {
    async fn handle(&self, event: &ChannelEvent) {
        if let Some(text) = Self::render(event) {
            eprintln!("{text}");
        }
        if let ChannelEvent::Disconnected { account_id, reason } = event {
            warn!(account_id, reason, "WhatsApp disconnected");
        }
    }
}

pub async fn run(config: CourierConfig) -> Result<()> {
    let relay = AttachmentRelay::from_config(&config).context("invalid relay configuration")?;
    info!(
        webhook = relay.webhook().url(),
        staging_dir = %relay.stager().dir().display(),
        "attachment relay ready"
    );

    let mut source = WhatsAppSource::new(config.whatsapp);
    let notices: Arc<dyn ChannelEventHandler> = Arc::new(OperatorNotices);
    for kind in [EventKind::Qr, EventKind::Ready, EventKind::Disconnected] {
        source.subscribe(kind, Arc::clone(&notices));
    }
    source.subscribe(EventKind::Message, Arc::new(relay));

    let stop = source.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            stop.notify_one();
        }
    });

    let result = source.run().await.context("WhatsApp source failed");
    source.shutdown().await;
    result
}
