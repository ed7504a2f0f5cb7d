//! WebSocket connection to the WhatsApp sidecar.
//!
//! A reader task owns the socket's read half. Media replies are matched to
//! their pending request right there, so a handler awaiting a download never
//! waits on the dispatch loop it is running in. Every other frame goes to the
//! event channel returned by [`connect`].

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    courier_channels::{Error, MediaPayload, Result},
    futures::{SinkExt, StreamExt},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{GatewayMessage, SidecarMessage};

pub use courier_config::schema::DEFAULT_SIDECAR_PORT;

/// Delay between connection attempts grows by this much per attempt.
const RETRY_STEP: Duration = Duration::from_millis(500);

/// A media reply as sent by the sidecar.
#[derive(Debug)]
struct MediaReply {
    data: Option<String>,
    mimetype: Option<String>,
    filename: Option<String>,
    error: Option<String>,
}

impl MediaReply {
    fn into_payload(self) -> Result<Option<MediaPayload>> {
        if let Some(error) = self.error {
            return Err(Error::unavailable(format!(
                "sidecar could not download media: {error}"
            )));
        }
        match (self.data, self.mimetype) {
            (Some(data), Some(mimetype)) => Ok(Some(MediaPayload {
                data,
                mimetype,
                filename: self.filename,
            })),
            _ => Ok(None),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<MediaReply>>>>;

/// Cloneable handle for talking to a connected sidecar.
#[derive(Clone)]
pub struct SidecarHandle {
    write_tx: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
}

impl SidecarHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a frame for the sidecar.
    pub fn send(&self, msg: &GatewayMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.write_tx
            .send(json)
            .map_err(|_| Error::unavailable("sidecar connection closed"))
    }

    /// Ask the sidecar for the media of `message_id` and wait for the reply.
    pub async fn download_media(
        &self,
        account_id: &str,
        message_id: &str,
        timeout: Duration,
    ) -> Result<Option<MediaPayload>> {
        if !self.is_connected() {
            return Err(Error::unavailable("sidecar connection closed"));
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        let request = GatewayMessage::DownloadMedia {
            request_id: request_id.clone(),
            account_id: account_id.to_string(),
            message_id: message_id.to_string(),
        };
        if let Err(e) = self.send(&request) {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }
        debug!(message_id, request_id, "requested media from sidecar");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply.into_payload(),
            Ok(Err(_)) => Err(Error::unavailable(
                "sidecar disconnected before media arrived",
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::timeout(format!("download media for {message_id}")))
            },
        }
    }
}

/// Connect to the sidecar listening on `port` (localhost).
pub async fn connect(port: u16) -> Result<(SidecarHandle, mpsc::UnboundedReceiver<SidecarMessage>)> {
    let url = format!("ws://127.0.0.1:{port}");
    let (ws, _response) = connect_async(&url)
        .await
        .map_err(|e| Error::external(format!("connect to sidecar at {url}"), e))?;
    info!(url, "connected to WhatsApp sidecar");

    let (mut sink, mut stream) = ws.split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let connected = Arc::new(AtomicBool::new(true));

    tokio::spawn(async move {
        while let Some(text) = write_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                warn!(error = %e, "failed to write to sidecar");
                break;
            }
        }
        let _ = sink.close().await;
    });

    {
        let pending = Arc::clone(&pending);
        let connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "sidecar connection error");
                        break;
                    },
                };
                let msg = match serde_json::from_str::<SidecarMessage>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = %e, "ignoring malformed sidecar frame");
                        continue;
                    },
                };
                match msg {
                    SidecarMessage::Media {
                        request_id,
                        data,
                        mimetype,
                        filename,
                        error,
                    } => {
                        let waiter = pending.lock().await.remove(&request_id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(MediaReply {
                                    data,
                                    mimetype,
                                    filename,
                                    error,
                                });
                            },
                            None => debug!(request_id, "media reply for unknown request"),
                        }
                    },
                    other => {
                        if event_tx.send(other).is_err() {
                            break;
                        }
                    },
                }
            }
            connected.store(false, Ordering::SeqCst);
            // Dropping the senders fails every outstanding download.
            pending.lock().await.clear();
            info!("sidecar connection closed");
        });
    }

    Ok((
        SidecarHandle {
            write_tx,
            pending,
            connected,
        },
        event_rx,
    ))
}

/// [`connect`] with up to `attempts` tries and a linearly growing delay,
/// for a sidecar process that may still be starting.
pub async fn connect_with_retry(
    port: u16,
    attempts: u32,
) -> Result<(SidecarHandle, mpsc::UnboundedReceiver<SidecarMessage>)> {
    let mut attempt = 1;
    loop {
        match connect(port).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < attempts => {
                debug!(attempt, error = %e, "sidecar not reachable yet, retrying");
                tokio::time::sleep(RETRY_STEP * attempt).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
