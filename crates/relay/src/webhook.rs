//! Multipart upload to the workflow webhook.

use std::{path::Path, time::Duration};

use {
    courier_config::WebhookConfig,
    reqwest::{
        Body, Client, StatusCode,
        multipart::{Form, Part},
    },
    tokio_util::io::ReaderStream,
    tracing::debug,
};

use crate::{
    error::{RelayError, Result},
    staging::StagedAttachment,
};

/// Longest response body kept in a [`RelayError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// Posts files to a fixed webhook URL as `multipart/form-data`.
///
/// The body is streamed from disk and no size limit is applied. The
/// boundary and `Content-Type` header come from reqwest's form encoder.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
    field_name: String,
}

impl WebhookClient {
    /// Client without a request timeout.
    pub fn new(url: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            field_name: field_name.into(),
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            field_name: config.field_name.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Upload a staged attachment. Returns the 2xx status on success.
    pub async fn forward(&self, staged: &StagedAttachment) -> Result<StatusCode> {
        let part = file_part(
            staged.path(),
            staged.len(),
            staged.file_name(),
            staged.mimetype(),
        )
        .await?;
        self.send(part).await
    }

    /// Upload an arbitrary file from disk.
    pub async fn forward_file(&self, path: &Path, mimetype: &str) -> Result<StatusCode> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| RelayError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment");
        let part = file_part(path, metadata.len(), file_name, mimetype).await?;
        self.send(part).await
    }

    async fn send(&self, part: Part) -> Result<StatusCode> {
        let form = Form::new().part(self.field_name.clone(), part);

        debug!(url = %self.url, field = %self.field_name, "posting attachment to webhook");
        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(status)
    }
}

async fn file_part(path: &Path, len: u64, file_name: &str, mimetype: &str) -> Result<Part> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| RelayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let body = Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, len)
        .file_name(file_name.to_string())
        .mime_str(mimetype)?)
}
