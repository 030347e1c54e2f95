//! `reqwest` transport for the AT-protocol XRPC endpoints used to post.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::single_shot::{BlobApi, Session};
use super::BlobRef;
use crate::config::Config;
use crate::error::CrossPostError;

pub struct BlueskyHttpApi {
    client: Client,
    service_url: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: WireBlob,
}

#[derive(Deserialize)]
struct WireBlob {
    #[serde(rename = "ref")]
    reference: WireLink,
    #[serde(rename = "mimeType")]
    mime_type: String,
    size: u64,
}

#[derive(Deserialize)]
struct WireLink {
    #[serde(rename = "$link")]
    link: String,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

impl BlueskyHttpApi {
    pub fn new(config: &Config) -> Result<Self, CrossPostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            service_url: config.bluesky_service_url.trim_end_matches('/').to_string(),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, method)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, CrossPostError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CrossPostError::Protocol(format!("HTTP {}: {}", status, body)));
        }
        serde_json::from_str(&body)
            .map_err(|e| CrossPostError::Protocol(format!("unexpected response ({e}): {body}")))
    }
}

#[async_trait]
impl BlobApi for BlueskyHttpApi {
    async fn create_session(&self, identifier: &str, password: &str) -> Result<Session, CrossPostError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn upload_blob(
        &self,
        session: &Session,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<BlobRef, CrossPostError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await?;
        let uploaded: UploadBlobResponse = Self::parse(response).await?;
        Ok(BlobRef {
            link: uploaded.blob.reference.link,
            mime_type: uploaded.blob.mime_type,
            size: uploaded.blob.size,
        })
    }

    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, CrossPostError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": collection,
                "record": record,
            }))
            .send()
            .await?;
        let created: CreateRecordResponse = Self::parse(response).await?;
        Ok(created.uri)
    }
}
