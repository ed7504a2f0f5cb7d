//! WhatsApp Web as an [`EventSource`].

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    courier_channels::{
        ChannelEvent, ChannelEventHandler, Dispatcher, Error, EventKind, EventSource, Result,
    },
    courier_config::WhatsAppConfig,
    tokio::sync::{Notify, watch},
    tracing::{debug, info, warn},
};

use crate::{
    message::WhatsAppMessage,
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{SidecarHandle, connect_with_retry},
    types::{ConnectionState, GatewayMessage, SidecarMessage},
};

/// Connection attempts before giving up on the sidecar.
const CONNECT_ATTEMPTS: u32 = 10;

/// Event source backed by the WhatsApp Web sidecar.
///
/// Constructed with its config, subscribed to, then [`run`](EventSource::run)
/// starts the sidecar (unless `auto_start` is off), logs the account in and
/// dispatches events one at a time until the sidecar goes away.
pub struct WhatsAppSource {
    config: WhatsAppConfig,
    dispatcher: Dispatcher,
    state: watch::Sender<ConnectionState>,
    process: Option<SidecarProcess>,
    sidecar: Option<SidecarHandle>,
    stop: Arc<Notify>,
}

impl WhatsAppSource {
    pub fn new(config: WhatsAppConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            dispatcher: Dispatcher::new(),
            state,
            process: None,
            sidecar: None,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.config.account_id
    }

    /// Follow connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Handle that makes [`run`](EventSource::run) return after the event
    /// currently being dispatched, if any.
    pub fn stop_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.stop)
    }

    /// Log the account out and stop a sidecar this source started.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.sidecar.take() {
            let _ = handle.send(&GatewayMessage::Logout {
                account_id: self.config.account_id.clone(),
            });
        }
        if let Some(mut process) = self.process.take()
            && let Err(e) = process.stop().await
        {
            warn!(error = %e, "failed to stop WhatsApp sidecar");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn ensure_sidecar_process(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            if process.is_running() {
                return Ok(());
            }
            warn!("sidecar process died, restarting");
        }

        let sidecar_dir = find_sidecar_dir(self.config.sidecar_dir.as_deref())
            .map_err(|e| Error::unavailable(format!("{e:#}")))?;
        let process = start_sidecar(SidecarConfig {
            sidecar_dir,
            port: self.config.sidecar_port,
            auth_dir: self.config.auth_dir.clone(),
        })
        .await
        .map_err(|e| Error::unavailable(format!("{e:#}")))?;
        self.process = Some(process);
        Ok(())
    }

    /// Map a sidecar frame to a channel event, updating connection state.
    fn translate(&self, msg: SidecarMessage, handle: &SidecarHandle) -> Option<ChannelEvent> {
        let ours = |account_id: &str| account_id == self.config.account_id;

        match msg {
            SidecarMessage::Qr { account_id, qr } if ours(&account_id) => {
                debug!(account_id, "received QR code from sidecar");
                self.state.send_replace(ConnectionState::QrReceived(qr.clone()));
                Some(ChannelEvent::Qr {
                    account_id,
                    code: qr,
                })
            },
            SidecarMessage::Connected {
                account_id,
                phone_number,
            } if ours(&account_id) => {
                info!(account_id, ?phone_number, "WhatsApp connected");
                self.state.send_replace(ConnectionState::Connected {
                    phone_number: phone_number.clone(),
                });
                Some(ChannelEvent::Ready {
                    account_id,
                    phone_number,
                })
            },
            SidecarMessage::Disconnected { account_id, reason } if ours(&account_id) => {
                warn!(account_id, reason, "WhatsApp disconnected");
                self.state.send_replace(ConnectionState::Disconnected);
                Some(ChannelEvent::Disconnected { account_id, reason })
            },
            SidecarMessage::LoggedOut { account_id } if ours(&account_id) => {
                info!(account_id, "WhatsApp logged out");
                self.state.send_replace(ConnectionState::Disconnected);
                Some(ChannelEvent::Disconnected {
                    account_id,
                    reason: "logged out".into(),
                })
            },
            SidecarMessage::InboundMessage {
                account_id,
                message_id,
                chat_id,
                sender_id,
                sender_name,
                has_media,
                timestamp,
            } if ours(&account_id) => {
                debug!(account_id, message_id, sender_id, has_media, "received inbound message");
                Some(ChannelEvent::Message(Arc::new(WhatsAppMessage {
                    account_id,
                    message_id,
                    chat_id,
                    sender_id,
                    sender_name,
                    has_media,
                    timestamp,
                    sidecar: handle.clone(),
                    media_timeout: Duration::from_secs(self.config.media_timeout_secs),
                })))
            },
            SidecarMessage::Error { account_id, error } => {
                warn!(?account_id, error, "sidecar error");
                None
            },
            SidecarMessage::Media { request_id, .. } => {
                debug!(request_id, "unsolicited media frame");
                None
            },
            other => {
                debug!(?other, "ignoring frame for another account");
                None
            },
        }
    }
}

#[async_trait]
impl EventSource for WhatsAppSource {
    fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn ChannelEventHandler>) {
        self.dispatcher.subscribe(kind, handler);
    }

    async fn run(&mut self) -> Result<()> {
        if self.config.auto_start {
            self.ensure_sidecar_process().await?;
        }

        let (handle, mut frames) = connect_with_retry(self.config.sidecar_port, CONNECT_ATTEMPTS).await?;
        handle.send(&GatewayMessage::Login {
            account_id: self.config.account_id.clone(),
            auth_dir: self
                .config
                .auth_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        })?;
        self.state.send_replace(ConnectionState::WaitingForQr);
        self.sidecar = Some(handle.clone());
        info!(account_id = %self.config.account_id, "waiting for WhatsApp events");

        let stop = Arc::clone(&self.stop);
        loop {
            let frame = tokio::select! {
                biased;
                () = stop.notified() => {
                    info!("stop requested, leaving event loop");
                    return Ok(());
                },
                frame = frames.recv() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            if let Some(event) = self.translate(frame, &handle) {
                self.dispatcher.dispatch(event).await;
            }
        }

        self.sidecar = None;
        self.state.send_replace(ConnectionState::Disconnected);
        warn!("sidecar event stream ended");
        Ok(())
    }
}
