//! Wire types for the sidecar WebSocket protocol.
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

/// Frames sent by the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    /// A new pairing code is available.
    Qr { account_id: String, qr: String },
    /// The account finished pairing and is online.
    Connected {
        account_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        account_id: String,
        #[serde(default)]
        reason: String,
    },
    LoggedOut { account_id: String },
    /// An inbound message. Media is fetched separately with
    /// [`GatewayMessage::DownloadMedia`].
    InboundMessage {
        account_id: String,
        message_id: String,
        chat_id: String,
        sender_id: String,
        #[serde(default)]
        sender_name: Option<String>,
        #[serde(default)]
        has_media: bool,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Reply to a [`GatewayMessage::DownloadMedia`] request.
    Media {
        request_id: String,
        /// Base64 content; absent when the message had no downloadable media.
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        mimetype: Option<String>,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        account_id: Option<String>,
        error: String,
    },
}

/// Frames sent to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login {
        account_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_dir: Option<String>,
    },
    Logout {
        account_id: String,
    },
    DownloadMedia {
        request_id: String,
        account_id: String,
        message_id: String,
    },
}

/// Connection state of the WhatsApp account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Login sent, no pairing code yet.
    WaitingForQr,
    /// Waiting for the operator to scan this code.
    QrReceived(String),
    Connected {
        phone_number: Option<String>,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inbound_message_with_defaults() {
        let json = r#"{
            "type": "inbound_message",
            "account_id": "default",
            "message_id": "false_15550001111@c.us_3EB0",
            "chat_id": "15550001111@c.us",
            "sender_id": "15550001111@c.us"
        }"#;
        let msg: SidecarMessage = serde_json::from_str(json).unwrap();
        match msg {
            SidecarMessage::InboundMessage {
                has_media,
                sender_name,
                timestamp,
                ..
            } => {
                assert!(!has_media);
                assert!(sender_name.is_none());
                assert!(timestamp.is_none());
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_media_reply() {
        let json = r#"{"type":"media","request_id":"r1","data":"JVBERg==","mimetype":"application/pdf","filename":"a.pdf"}"#;
        let msg: SidecarMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, SidecarMessage::Media {
            request_id: "r1".into(),
            data: Some("JVBERg==".into()),
            mimetype: Some("application/pdf".into()),
            filename: Some("a.pdf".into()),
            error: None,
        });
    }

    #[test]
    fn logged_out_uses_snake_case_tag() {
        let msg: SidecarMessage =
            serde_json::from_str(r#"{"type":"logged_out","account_id":"a"}"#).unwrap();
        assert_eq!(msg, SidecarMessage::LoggedOut {
            account_id: "a".into()
        });
    }

    #[test]
    fn serializes_gateway_frames() {
        let login = serde_json::to_value(GatewayMessage::Login {
            account_id: "default".into(),
            auth_dir: None,
        })
        .unwrap();
        assert_eq!(
            login,
            serde_json::json!({"type": "login", "account_id": "default"})
        );

        let download = serde_json::to_value(GatewayMessage::DownloadMedia {
            request_id: "r1".into(),
            account_id: "default".into(),
            message_id: "m1".into(),
        })
        .unwrap();
        assert_eq!(download["type"], "download_media");
        assert_eq!(download["message_id"], "m1");
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<SidecarMessage>(r#"{"type":"typing"}"#).is_err());
    }
}
