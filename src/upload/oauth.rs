//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Every request to the chunked endpoint is signed on its own from the
//! long-lived consumer/access pairs plus method, URL and parameters. Only
//! query and form parameters enter the signature base; JSON and multipart
//! bodies never do.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::credentials::TwitterCredentials;
use crate::error::CrossPostError;

/// RFC 3986 unreserved characters stay literal
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// `Authorization` header for a request, with a fresh nonce and timestamp
pub fn authorization_header(
    method: &str,
    url: &str,
    params: &[(String, String)],
    credentials: &TwitterCredentials,
) -> Result<String, CrossPostError> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    authorization_header_with(method, url, params, credentials, &nonce, timestamp)
}

pub fn authorization_header_with(
    method: &str,
    url: &str,
    params: &[(String, String)],
    credentials: &TwitterCredentials,
    nonce: &str,
    timestamp: u64,
) -> Result<String, CrossPostError> {
    let mut oauth_params = vec![
        ("oauth_consumer_key".to_string(), credentials.consumer_key.clone()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), credentials.access_token.clone()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];

    let mut all_params = oauth_params.clone();
    all_params.extend(params.iter().cloned());
    let signature = sign(
        method,
        url,
        &all_params,
        &credentials.consumer_secret,
        &credentials.access_secret,
    )?;
    oauth_params.push(("oauth_signature".to_string(), signature));
    oauth_params.sort();

    let fields: Vec<String> = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect();
    Ok(format!("OAuth {}", fields.join(", ")))
}

/// Signature base string: METHOD&url&sorted-params, each part percent-encoded
pub fn signature_base(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, CrossPostError> {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let base = signature_base(method, url, params);

    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| CrossPostError::Protocol(format!("cannot sign request: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
