use serde::Deserialize;

use crate::counters::Hit;
use crate::error::ClientError;
use crate::responder::{ApiPath, NEW_API_ERROR, OLD_API_ERROR};

/// Status and body of one response, as seen by the traffic generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    #[serde(default)]
    msg: Option<serde_json::Value>,
}

/// Map a response onto a counter update.
///
/// Failures are matched on the marker substrings, so both the plain-text
/// and the `{msg, error}` error bodies classify the same way. `Ok(None)`
/// means the response is valid but carries no recognised marker.
pub fn classify(response: &RawResponse) -> Result<Option<Hit>, ClientError> {
    if !response.is_success() {
        let hit = if response.body.contains(OLD_API_ERROR) {
            Some(Hit::failure(ApiPath::Old))
        } else if response.body.contains(NEW_API_ERROR) {
            Some(Hit::failure(ApiPath::New))
        } else {
            None
        };
        return Ok(hit);
    }

    let body: SuccessBody = serde_json::from_str(&response.body)?;
    let hit = match body.msg.as_ref().and_then(|m| m.as_str()) {
        Some("OLD") => Some(Hit::success(ApiPath::Old)),
        Some("NEW") => Some(Hit::success(ApiPath::New)),
        _ => None,
    };
    Ok(hit)
}
