//! Wire client for proxied requests to one peer node.
//!
//! Each peer gets one persistent HTTP/1.1 client with a hard per-request
//! deadline. A timeout or transport error is reported as "no response" —
//! the coordinator counts it against the quorum and moves on; the peer
//! may well still complete the operation.

use std::time::{Duration, UNIX_EPOCH};

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::engine::KeyState;

use super::{EXPIRES_HEADER, PROXY_HEADER, PROXY_HEADER_VALUE, TIMESTAMP_HEADER};

/// Hard deadline for any single peer round-trip.
pub const PEER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Persistent client for one peer's `/v0/entity` endpoint.
#[derive(Debug, Clone)]
pub struct PeerClient {
    base: String,
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(base: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base: base.into(),
            http: reqwest::Client::builder().timeout(PEER_TIMEOUT).build()?,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn entity_url(&self) -> String {
        format!("{}/v0/entity", self.base)
    }

    /// Replica-level read. `None` means the peer did not answer usably.
    pub async fn get(&self, id: &str) -> Option<KeyState> {
        let response = self
            .http
            .get(self.entity_url())
            .query(&[("id", id)])
            .header(PROXY_HEADER, PROXY_HEADER_VALUE)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                debug!(peer = %self.base, %err, "peer GET did not respond");
                return None;
            }
        };

        let timestamp = parse_timestamp(&response);
        match response.status() {
            StatusCode::OK => {
                let Some(timestamp) = timestamp else {
                    warn!(peer = %self.base, "200 reply without a usable timestamp header");
                    return None;
                };
                let value = match response.bytes().await {
                    Ok(body) => body.to_vec(),
                    Err(err) => {
                        debug!(peer = %self.base, %err, "peer GET body failed");
                        return None;
                    }
                };
                Some(KeyState::Present { timestamp, value })
            }
            StatusCode::NOT_FOUND => Some(match timestamp {
                Some(timestamp) => KeyState::Removed { timestamp },
                None => KeyState::Absent,
            }),
            status => {
                debug!(peer = %self.base, %status, "peer GET failed");
                None
            }
        }
    }

    /// Replica-level write; true when the peer acknowledged with 2xx.
    pub async fn put(&self, id: &str, value: Vec<u8>, expire: Option<i64>) -> bool {
        let mut request = self
            .http
            .put(self.entity_url())
            .query(&[("id", id)])
            .header(PROXY_HEADER, PROXY_HEADER_VALUE)
            .body(value);
        if let Some(expire) = expire {
            request = request.header(EXPIRES_HEADER, format_expires(expire));
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(peer = %self.base, %err, "peer PUT did not respond");
                false
            }
        }
    }

    /// Replica-level delete; true when the peer acknowledged with 2xx.
    pub async fn delete(&self, id: &str) -> bool {
        let request = self
            .http
            .delete(self.entity_url())
            .query(&[("id", id)])
            .header(PROXY_HEADER, PROXY_HEADER_VALUE);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(peer = %self.base, %err, "peer DELETE did not respond");
                false
            }
        }
    }
}

fn parse_timestamp(response: &reqwest::Response) -> Option<i64> {
    response
        .headers()
        .get(TIMESTAMP_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Formats an absolute expiration instant (nanoseconds) as RFC1123 GMT.
pub fn format_expires(expire: i64) -> String {
    let instant = if expire <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_nanos(expire as u64)
    };
    httpdate::fmt_http_date(instant)
}

/// Parses an RFC1123-GMT instant into nanoseconds since the epoch.
pub fn parse_expires(raw: &str) -> Option<i64> {
    let instant = httpdate::parse_http_date(raw).ok()?;
    let since_epoch = instant.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_nanos()).ok().or(Some(i64::MAX))
}
