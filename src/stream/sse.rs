//! SSE Stream Transport
//!
//! Production [`StreamTransport`]: inbound events arrive as `data:` lines on
//! a long-lived `GET /events` response, outbound client events are POSTed
//! back to the same endpoint. The streaming client carries no global request
//! timeout (it would sever the event stream); outbound POSTs set one per
//! request.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::stream::{Connection, StreamTransport};
use crate::types::{ClientEvent, ServerEvent};

/// Timeout for outbound event POSTs
const POST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SseTransport {
    config: Config,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    async fn connect(&self) -> Result<Connection, ApiError> {
        let auth = self
            .config
            .token()
            .map(|t| format!("Bearer {}", t))
            .ok_or(ApiError::NotAuthenticated)?;
        let url = self.config.api_url("/events");

        let response = self
            .client
            .get(&url)
            .header("Authorization", &auth)
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: status.to_string(),
            });
        }
        debug!("event stream established");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ClientEvent>();

        // Reader: buffer the byte stream into lines, decode `data:` frames.
        // Dropping `event_tx` on exit closes the channel, which is how the
        // manager observes the transport drop.
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(error = %err, "error reading event stream");
                        break;
                    }
                };
                let chunk_str = match std::str::from_utf8(&chunk) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(error = %err, "invalid UTF-8 in event stream");
                        break;
                    }
                };
                buffer.push_str(chunk_str);

                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline_pos);

                    // Skip blank lines and keepalive comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    match serde_json::from_str::<ServerEvent>(data) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "unrecognized stream event: {}", data);
                        }
                    }
                }
            }
        });

        // Writer: POST each outbound client event.
        let client = self.client.clone();
        let post_url = url.clone();
        tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                let result = client
                    .post(&post_url)
                    .header("Authorization", &auth)
                    .timeout(POST_TIMEOUT)
                    .json(&event)
                    .send()
                    .await;
                match result {
                    Ok(response) if !response.status().is_success() => {
                        warn!(status = %response.status(), "client event rejected");
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to send client event");
                    }
                    _ => {}
                }
            }
        });

        Ok(Connection {
            incoming: event_rx,
            outgoing: client_tx,
        })
    }
}
