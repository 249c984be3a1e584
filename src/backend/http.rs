use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use crate::common::{AttachmentRef, ThreadId};
use crate::error::{ChatError, Result};

use super::AttachmentStore;

/// Attachment store backed by plain HTTP: `GET` the reference to fetch,
/// `PUT` under `upload_base` to upload.
#[derive(Clone)]
pub struct HttpAttachmentStore {
    client: Client,
    upload_base: Option<String>,
}

impl HttpAttachmentStore {
    pub fn new(upload_base: Option<String>) -> Self {
        Self {
            client: Client::new(),
            upload_base: upload_base.map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    fn upload_url(&self, thread_id: &ThreadId) -> Option<String> {
        self.upload_base.as_ref().map(|base| {
            format!(
                "{base}/{}/{}.jpg",
                thread_id.as_str().replace(':', "_"),
                Uuid::new_v4()
            )
        })
    }
}

fn is_http(reference: &AttachmentRef) -> bool {
    let value = reference.as_str();
    value.starts_with("http://") || value.starts_with("https://")
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn fetch(&self, reference: &AttachmentRef) -> Result<Vec<u8>> {
        if !is_http(reference) {
            return Err(ChatError::fetch(reference, "unsupported attachment reference"));
        }

        let response = self
            .client
            .get(reference.as_str())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ChatError::fetch(reference, err))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ChatError::fetch(reference, err))?;

        log::debug!("Fetched {} bytes from {reference}", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn upload(&self, thread_id: &ThreadId, data: Vec<u8>) -> Result<AttachmentRef> {
        let Some(url) = self.upload_url(thread_id) else {
            return Err(ChatError::AttachmentUpload(
                "no attachment upload endpoint configured".to_string(),
            ));
        };

        let size = data.len();
        self.client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(data)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ChatError::AttachmentUpload(err.to_string()))?;

        log::info!("Uploaded {size} bytes to {url}");
        Ok(AttachmentRef::new(url))
    }
}
