//! `reqwest` transport for the chunked media endpoint and tweet creation.
//!
//! INIT and FINALIZE are form-encoded, APPEND carries its command fields in
//! the query string and the bytes as a multipart `media` part, STATUS is a
//! signed GET. Tweet creation posts JSON, so the signature covers no body
//! parameters.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::chunked::{ChunkedMediaApi, InitRequest, MediaUploadResponse};
use super::oauth;
use crate::config::Config;
use crate::credentials::TwitterCredentials;
use crate::error::CrossPostError;

pub struct TwitterHttpApi {
    client: Client,
    upload_url: String,
    tweet_url: String,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

impl TwitterHttpApi {
    pub fn new(config: &Config) -> Result<Self, CrossPostError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            upload_url: config.twitter_upload_url.clone(),
            tweet_url: config.twitter_tweet_url.clone(),
        })
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

    async fn post_form(
        &self,
        credentials: &TwitterCredentials,
        form: Vec<(String, String)>,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        let auth = oauth::authorization_header("POST", &self.upload_url, &form, credentials)?;
        let response = self
            .client
            .post(&self.upload_url)
            .header(AUTHORIZATION, auth)
            .form(&form)
            .send()
            .await?;
        Self::parse(response).await
    }
}

#[async_trait]
impl ChunkedMediaApi for TwitterHttpApi {
    async fn init(
        &self,
        credentials: &TwitterCredentials,
        request: &InitRequest,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        let total_bytes = request.total_bytes.to_string();
        let form = params(&[
            ("command", "INIT"),
            ("total_bytes", &total_bytes),
            ("media_type", &request.media_type),
            ("media_category", request.media_category),
        ]);
        self.post_form(credentials, form).await
    }

    async fn append(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
        segment_index: usize,
        chunk: Vec<u8>,
    ) -> Result<(), CrossPostError> {
        let segment = segment_index.to_string();
        let query = params(&[
            ("command", "APPEND"),
            ("media_id", media_id),
            ("segment_index", &segment),
        ]);
        let auth = oauth::authorization_header("POST", &self.upload_url, &query, credentials)?;
        let form = Form::new().part("media", Part::bytes(chunk).file_name("chunk"));

        let response = self
            .client
            .post(&self.upload_url)
            .query(&query)
            .header(AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrossPostError::Protocol(format!(
                "APPEND segment {} rejected, HTTP {}: {}",
                segment_index, status, body
            )));
        }
        Ok(())
    }

    async fn finalize(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        let form = params(&[("command", "FINALIZE"), ("media_id", media_id)]);
        self.post_form(credentials, form).await
    }

    async fn status(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        let query = params(&[("command", "STATUS"), ("media_id", media_id)]);
        let auth = oauth::authorization_header("GET", &self.upload_url, &query, credentials)?;
        let response = self
            .client
            .get(&self.upload_url)
            .query(&query)
            .header(AUTHORIZATION, auth)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn create_tweet(
        &self,
        credentials: &TwitterCredentials,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, CrossPostError> {
        let mut body = json!({ "text": text });
        if !media_ids.is_empty() {
            body["media"] = json!({ "media_ids": media_ids });
        }

        let auth = oauth::authorization_header("POST", &self.tweet_url, &[], credentials)?;
        let response = self
            .client
            .post(&self.tweet_url)
            .header(AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await?;
        let created: TweetResponse = Self::parse(response).await?;
        Ok(created.data.id)
    }
}
