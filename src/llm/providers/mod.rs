pub mod anthropic;
pub mod bedrock;
pub mod openai_compatible;

use std::time::Duration;

use crate::errors::{ScribeError, ScribeResult};

/// Strings longer than this under an image key are replaced when logging.
const LOG_IMAGE_THRESHOLD: usize = 256;

pub(crate) fn build_client(timeout: Duration) -> ScribeResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| ScribeError::Config(format!("HTTP client: {e}")))
}

/// Render a request body for debug logs with base64 image payloads omitted.
pub(crate) fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    omit_images(&mut log_body);
    serde_json::to_string(&log_body).unwrap_or_default()
}

fn omit_images(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                let is_image_key = key == "url" || key == "data";
                let oversized = v.as_str().map_or(false, |s| s.len() > LOG_IMAGE_THRESHOLD);
                if is_image_key && oversized {
                    *v = serde_json::Value::String("<omitted_base64_image>".to_string());
                } else {
                    omit_images(v);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(omit_images),
        _ => {}
    }
}

/// Turn a non-2xx response into a backend error carrying the body text.
pub(crate) async fn ensure_success(response: reqwest::Response) -> ScribeResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let err_body = response.text().await.unwrap_or_default();
    Err(ScribeError::Backend(format!("{}: {}", status, err_body)))
}

/// Error envelopes some gateways return with a 200 status.
pub(crate) fn error_envelope(json: &serde_json::Value) -> Option<String> {
    if let Some(err) = json.get("error") {
        if !err.is_null() {
            let message = err["message"].as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return Some(message);
        }
    }
    if json["type"].as_str() == Some("error") {
        return Some(json.to_string());
    }
    None
}
