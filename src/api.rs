//! HTTP API Client
//!
//! The request/response surface the engine consumes, behind the [`ChatApi`]
//! trait so tests can inject a scripted double. [`HttpChatApi`] is the
//! production implementation over reqwest; every call carries the bearer
//! credential and short-circuits with `NotAuthenticated` when none is set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::types::{Attachment, MessagePayload, UserRef};

/// One page of a conversation's message history, newest-first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessagePayload>,
    pub page: u32,
    pub total_pages: u32,
}

impl MessagePage {
    /// Whether another page exists after this one
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Body of a send request; attachments are sent by uploaded reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Conversation summary as served by `GET /api/conversations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPayload {
    pub peer: UserRef,
    #[serde(default)]
    pub last_message: Option<MessagePayload>,
    #[serde(default)]
    pub unread_count: u32,
}

/// Global unread counter as served by `GET /api/unread-count`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: u32,
}

/// Error body shape the server uses for rejected requests
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// The platform messaging API consumed by the engine
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /api/conversations`
    async fn conversations(&self) -> Result<Vec<ConversationPayload>, ApiError>;

    /// `GET /api/conversation/{peer}?page=` - pages are 1-based, newest-first
    async fn messages(&self, peer: Uuid, page: u32) -> Result<MessagePage, ApiError>;

    /// `POST /api/send/{peer}` - returns the server-confirmed message
    async fn send_message(
        &self,
        peer: Uuid,
        body: SendMessageBody,
    ) -> Result<MessagePayload, ApiError>;

    /// `PUT /api/mark-read/{peer}`
    async fn mark_read(&self, peer: Uuid) -> Result<(), ApiError>;

    /// `PATCH /api/edit/{id}`
    async fn edit_message(&self, id: Uuid, text: &str) -> Result<(), ApiError>;

    /// `DELETE /api/delete-me/{id}` - removes the message on this device only
    async fn delete_for_me(&self, id: Uuid) -> Result<(), ApiError>;

    /// `DELETE /api/delete-everyone/{id}` - unsend, mirrored to the peer
    async fn delete_for_everyone(&self, id: Uuid) -> Result<(), ApiError>;

    /// `DELETE /api/clear/{peer}` - clears history on this device
    async fn clear_history(&self, peer: Uuid) -> Result<(), ApiError>;

    /// `GET /api/unread-count`
    async fn unread_count(&self) -> Result<u32, ApiError>;
}

/// Production [`ChatApi`] over reqwest
pub struct HttpChatApi {
    config: Config,
    client: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.config
            .token()
            .map(|t| format!("Bearer {}", t))
            .ok_or(ApiError::NotAuthenticated)
    }

    /// Check the response status, extracting the server's error message from
    /// the body when one is present.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.text().await {
            Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => parsed.error,
                Err(_) if !body.is_empty() => body,
                Err(_) => status.to_string(),
            },
            Err(_) => status.to_string(),
        };
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let auth = self.bearer()?;
        let response = self
            .client
            .get(self.config.api_url(path))
            .header("Authorization", auth)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_no_body(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<(), ApiError> {
        let auth = self.bearer()?;
        let response = self
            .client
            .request(method, self.config.api_url(path))
            .header("Authorization", auth)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn conversations(&self) -> Result<Vec<ConversationPayload>, ApiError> {
        self.get_json("/api/conversations").await
    }

    async fn messages(&self, peer: Uuid, page: u32) -> Result<MessagePage, ApiError> {
        self.get_json(&format!("/api/conversation/{}?page={}", peer, page))
            .await
    }

    async fn send_message(
        &self,
        peer: Uuid,
        body: SendMessageBody,
    ) -> Result<MessagePayload, ApiError> {
        let auth = self.bearer()?;
        let response = self
            .client
            .post(self.config.api_url(&format!("/api/send/{}", peer)))
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json::<MessagePayload>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn mark_read(&self, peer: Uuid) -> Result<(), ApiError> {
        self.send_no_body(reqwest::Method::PUT, &format!("/api/mark-read/{}", peer))
            .await
    }

    async fn edit_message(&self, id: Uuid, text: &str) -> Result<(), ApiError> {
        let auth = self.bearer()?;
        let response = self
            .client
            .patch(self.config.api_url(&format!("/api/edit/{}", id)))
            .header("Authorization", auth)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_for_me(&self, id: Uuid) -> Result<(), ApiError> {
        self.send_no_body(reqwest::Method::DELETE, &format!("/api/delete-me/{}", id))
            .await
    }

    async fn delete_for_everyone(&self, id: Uuid) -> Result<(), ApiError> {
        self.send_no_body(
            reqwest::Method::DELETE,
            &format!("/api/delete-everyone/{}", id),
        )
        .await
    }

    async fn clear_history(&self, peer: Uuid) -> Result<(), ApiError> {
        self.send_no_body(reqwest::Method::DELETE, &format!("/api/clear/{}", peer))
            .await
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        let response: UnreadCountResponse = self.get_json("/api/unread-count").await?;
        Ok(response.count)
    }
}
