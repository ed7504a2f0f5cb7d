#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    courier_channels::{ChannelEvent, Dispatcher, EventKind, InboundMessage, MediaPayload},
    courier_config::StagingNaming,
    courier_relay::{AttachmentRelay, RelayError, RelayOutcome, SkipReason, Stager, WebhookClient},
    tracing_subscriber::fmt::MakeWriter,
    wiremock::{
        Mock, MockServer, Request, Respond, ResponseTemplate,
        matchers::{method, path},
    },
};

const HOOK_PATH: &str = "/webhook/whatsapp-pdf";

struct FakeMessage {
    id: String,
    has_media: bool,
    media: Option<MediaPayload>,
    fail_download: bool,
    downloads: AtomicUsize,
}

impl FakeMessage {
    fn text(id: &str) -> Self {
        Self {
            id: id.into(),
            has_media: false,
            media: None,
            fail_download: false,
            downloads: AtomicUsize::new(0),
        }
    }

    fn with_media(id: &str, mimetype: &str, data: String) -> Self {
        Self {
            id: id.into(),
            has_media: true,
            media: Some(MediaPayload {
                data,
                mimetype: mimetype.into(),
                filename: None,
            }),
            fail_download: false,
            downloads: AtomicUsize::new(0),
        }
    }

    fn pdf(id: &str, bytes: &[u8]) -> Self {
        Self::with_media(id, "application/pdf", STANDARD.encode(bytes))
    }
}

#[async_trait]
impl InboundMessage for FakeMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn chat_id(&self) -> &str {
        "15550001111@c.us"
    }

    fn sender(&self) -> &str {
        "15550001111@c.us"
    }

    fn has_media(&self) -> bool {
        self.has_media
    }

    async fn download_media(&self) -> courier_channels::Result<Option<MediaPayload>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_download {
            return Err(courier_channels::Error::timeout("download_media"));
        }
        Ok(self.media.clone())
    }
}

/// Captures the staged file's contents at the moment the upload arrives.
struct SnapshotStaged {
    path: PathBuf,
    seen: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Respond for SnapshotStaged {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        *self.seen.lock().unwrap() = std::fs::read(&self.path).ok();
        ResponseTemplate::new(200)
    }
}

/// Replaces the staged file with a non-empty directory before answering, so
/// the relay's removal afterwards fails.
struct BlockStagedRemoval {
    path: PathBuf,
    status: u16,
}

impl Respond for BlockStagedRemoval {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        std::fs::remove_file(&self.path).unwrap();
        std::fs::create_dir(&self.path).unwrap();
        std::fs::write(self.path.join("keep"), b"x").unwrap();
        ResponseTemplate::new(self.status)
    }
}

fn relay_for(server_uri: &str, staging: &Path) -> AttachmentRelay {
    AttachmentRelay::new(
        Stager::new(staging, StagingNaming::PerMessage, "whatsapp.pdf"),
        WebhookClient::new(format!("{server_uri}{HOOK_PATH}"), "data"),
        vec!["application/pdf".into()],
    )
}

fn staged_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn message_without_media_is_ignored() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());
    let message = FakeMessage::text("m-text");

    let outcome = relay.handle_incoming_message(&message).await;

    assert!(matches!(outcome, RelayOutcome::Skipped {
        reason: SkipReason::NoMedia,
        ..
    }));
    assert_eq!(message.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(staged_files(dir.path()), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_pdf_media_is_ignored() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());
    let message = FakeMessage::with_media("m-png", "image/png", STANDARD.encode(b"\x89PNG"));

    let outcome = relay.handle_incoming_message(&message).await;

    match outcome {
        RelayOutcome::Skipped {
            reason: SkipReason::UnsupportedType(mime),
            ..
        } => assert_eq!(mime, "image/png"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(staged_files(dir.path()), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn mime_type_match_is_exact() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());

    for mime in ["application/PDF", "application/pdf; charset=binary", " application/pdf"] {
        let message = FakeMessage::with_media("m", mime, STANDARD.encode(b"%PDF"));
        let outcome = relay.handle_incoming_message(&message).await;
        assert!(
            matches!(outcome, RelayOutcome::Skipped {
                reason: SkipReason::UnsupportedType(_),
                ..
            }),
            "{mime} should be skipped"
        );
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn media_flag_without_payload_is_skipped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());
    let mut message = FakeMessage::text("m-gone");
    message.has_media = true;

    let outcome = relay.handle_incoming_message(&message).await;

    assert!(matches!(outcome, RelayOutcome::Skipped {
        reason: SkipReason::MediaUnavailable,
        ..
    }));
    assert_eq!(message.downloads.load(Ordering::SeqCst), 1);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn pdf_is_forwarded_and_staged_file_removed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let pdf = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n".to_vec();

    let seen = Arc::new(Mutex::new(None));
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(SnapshotStaged {
            path: dir.path().join("m-pdf.pdf"),
            seen: Arc::clone(&seen),
        })
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server.uri(), dir.path());
    let outcome = relay
        .handle_incoming_message(&FakeMessage::pdf("m-pdf", &pdf))
        .await;

    match outcome {
        RelayOutcome::Forwarded {
            ref message_id,
            bytes,
            status,
        } => {
            assert_eq!(message_id, "m-pdf");
            assert_eq!(bytes, pdf.len() as u64);
            assert_eq!(status, 200);
        },
        ref other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(outcome.is_delivered());

    // Staged file held the decoded bytes while the upload was in flight.
    assert_eq!(seen.lock().unwrap().as_deref(), Some(pdf.as_slice()));
    // And is gone afterwards.
    assert_eq!(staged_files(dir.path()), 0);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    let content_type = request
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    assert!(contains(&request.body, b"name=\"data\""));
    assert!(contains(&request.body, &pdf));
    // Exactly one part.
    let boundary = content_type.split("boundary=").nth(1).unwrap();
    let delimiter = format!("--{boundary}\r\n");
    assert_eq!(
        request
            .body
            .windows(delimiter.len())
            .filter(|w| *w == delimiter.as_bytes())
            .count(),
        1
    );
}

#[tokio::test]
async fn arbitrary_binary_round_trips_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());

    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024 + 7).collect();
    let outcome = relay
        .handle_incoming_message(&FakeMessage::pdf("m-bin", &payload))
        .await;
    assert!(matches!(outcome, RelayOutcome::Forwarded { status: 204, .. }));

    let requests = server.received_requests().await.unwrap();
    assert!(contains(&requests[0].body, &payload));
}

#[tokio::test]
async fn rejected_upload_is_contained_and_next_event_still_handled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow crashed"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());

    let first = relay
        .handle_incoming_message(&FakeMessage::pdf("m-1", b"%PDF-1.4 one"))
        .await;
    match first.error() {
        Some(RelayError::Rejected { status, body }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "workflow crashed");
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(first.is_failed());
    // Staged file is cleaned up on the failure path too.
    assert_eq!(staged_files(dir.path()), 0);

    let second = relay
        .handle_incoming_message(&FakeMessage::pdf("m-2", b"%PDF-1.4 two"))
        .await;
    assert!(second.is_delivered());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_webhook_is_transport_failure() {
    let dir = tempfile::tempdir().unwrap();
    // Port 9 (discard) is closed on test hosts.
    let relay = relay_for("http://127.0.0.1:9", dir.path());

    let outcome = relay
        .handle_incoming_message(&FakeMessage::pdf("m-down", b"%PDF"))
        .await;

    assert!(matches!(outcome.error(), Some(RelayError::Transport(_))));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn invalid_base64_fails_before_staging() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());
    let message = FakeMessage::with_media("m-bad", "application/pdf", "%%% not base64 %%%".into());

    let outcome = relay.handle_incoming_message(&message).await;

    assert!(matches!(outcome.error(), Some(RelayError::Decode(_))));
    assert_eq!(staged_files(dir.path()), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn download_error_is_contained() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let relay = relay_for(&server.uri(), dir.path());
    let mut message = FakeMessage::pdf("m-timeout", b"%PDF");
    message.fail_download = true;

    let outcome = relay.handle_incoming_message(&message).await;

    assert!(matches!(outcome.error(), Some(RelayError::Download(_))));
    assert_eq!(outcome.message_id(), "m-timeout");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn fixed_staging_name_is_reused_and_removed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(None));
    Mock::given(method("POST"))
        .respond_with(SnapshotStaged {
            path: dir.path().join("whatsapp.pdf"),
            seen: Arc::clone(&seen),
        })
        .mount(&server)
        .await;

    let relay = AttachmentRelay::new(
        Stager::new(dir.path(), StagingNaming::Fixed, "whatsapp.pdf"),
        WebhookClient::new(server.uri(), "data"),
        vec!["application/pdf".into()],
    );

    for (id, body) in [("a", b"%PDF first".as_slice()), ("b", b"%PDF second".as_slice())] {
        let outcome = relay
            .handle_incoming_message(&FakeMessage::pdf(id, body))
            .await;
        assert!(outcome.is_delivered());
        assert_eq!(seen.lock().unwrap().as_deref(), Some(body));
        assert!(!dir.path().join("whatsapp.pdf").exists());
    }
}

#[tokio::test]
async fn relay_subscribed_to_dispatcher_handles_message_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let mut dispatcher = Dispatcher::new();
    dispatcher.subscribe(
        EventKind::Message,
        Arc::new(relay_for(&server.uri(), dir.path())),
    );

    dispatcher
        .dispatch(ChannelEvent::Ready {
            account_id: "default".into(),
            phone_number: None,
        })
        .await;
    dispatcher
        .dispatch(ChannelEvent::Message(Arc::new(FakeMessage::text("m-text"))))
        .await;
    dispatcher
        .dispatch(ChannelEvent::Message(Arc::new(FakeMessage::pdf(
            "m-pdf", b"%PDF-1.4",
        ))))
        .await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn removal_failure_after_delivery_is_cleanup_failed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let staged = dir.path().join("m-c.pdf");
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(BlockStagedRemoval {
            path: staged.clone(),
            status: 200,
        })
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server.uri(), dir.path());
    let outcome = relay
        .handle_incoming_message(&FakeMessage::pdf("m-c", b"%PDF-1.4 cleanup"))
        .await;

    assert!(outcome.is_delivered());
    assert!(!outcome.is_failed());
    match outcome {
        RelayOutcome::CleanupFailed {
            message_id,
            status,
            error: RelayError::Cleanup { path, .. },
        } => {
            assert_eq!(message_id, "m-c");
            assert_eq!(status, 200);
            assert_eq!(path, staged);
        },
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(staged.is_dir());
}

#[tokio::test]
async fn removal_failure_after_rejected_upload_keeps_delivery_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let staged = dir.path().join("m-r.pdf");
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(BlockStagedRemoval {
            path: staged.clone(),
            status: 500,
        })
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server.uri(), dir.path());
    let outcome = relay
        .handle_incoming_message(&FakeMessage::pdf("m-r", b"%PDF-1.4 rejected"))
        .await;

    assert!(outcome.is_failed());
    assert!(!outcome.is_delivered());
    assert!(
        matches!(outcome.error(), Some(RelayError::Rejected { status: 500, .. })),
        "{outcome:?}"
    );
}

/// Log sink for asserting on emitted lines.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn logs_name_the_accepted_type_instead_of_assuming_pdf() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let relay = AttachmentRelay::new(
        Stager::new(dir.path(), StagingNaming::PerMessage, "whatsapp.pdf"),
        WebhookClient::new(format!("{}{HOOK_PATH}", server.uri()), "data"),
        vec!["image/png".into()],
    );

    let outcome = relay
        .handle_incoming_message(&FakeMessage::with_media(
            "m-png",
            "image/png",
            STANDARD.encode(b"\x89PNG"),
        ))
        .await;
    assert!(matches!(outcome, RelayOutcome::Forwarded { .. }));

    let text = logs.text();
    assert!(text.contains("attachment received"), "{text}");
    assert!(text.contains("image/png"), "{text}");
    assert!(text.contains("attachment sent to webhook"), "{text}");
    assert!(!text.contains("PDF"), "{text}");
}
