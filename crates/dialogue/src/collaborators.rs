//! External collaborators the agent talks to during a call.
//!
//! Real deployments plug in an email sender and an image analysis
//! pipeline. The stub keeps everything in memory and is what tests and
//! demos run against.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Collaborator failures, opaque to the dialogue layer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("unknown upload token")]
    UnknownToken,
}

/// A single-use link for uploading an appliance photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadToken {
    pub token: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of asking for an uploaded image's analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageAnalysis {
    /// Nothing uploaded yet.
    Pending,
    /// Token expired or was already consumed.
    Expired,
    Ready { summary: String },
}

/// Sends the upload link to the caller's email.
#[async_trait]
pub trait EmailCollaborator: Send + Sync {
    async fn send_upload_link(
        &self,
        email: &str,
        call_id: &str,
    ) -> Result<UploadToken, CollaboratorError>;
}

/// Looks up analysis results for an uploaded image.
#[async_trait]
pub trait ImageCollaborator: Send + Sync {
    async fn analysis(&self, token: &str) -> Result<ImageAnalysis, CollaboratorError>;
}

struct TokenState {
    expires_at: DateTime<Utc>,
    consumed: bool,
}

/// In-memory upload service implementing both collaborator traits.
/// Tokens live 24 hours and answer exactly one analysis request.
#[derive(Default)]
pub struct StubUploadService {
    tokens: Mutex<HashMap<String, TokenState>>,
}

impl StubUploadService {
    pub fn new() -> Self {
        Self::default()
    }
}

const TOKEN_TTL_HOURS: i64 = 24;

#[async_trait]
impl EmailCollaborator for StubUploadService {
    async fn send_upload_link(
        &self,
        email: &str,
        call_id: &str,
    ) -> Result<UploadToken, CollaboratorError> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);
        self.tokens.lock().insert(
            token.clone(),
            TokenState {
                expires_at,
                consumed: false,
            },
        );
        tracing::info!(%email, call_id, "issued upload link");
        Ok(UploadToken {
            upload_url: format!("https://uploads.homeserv.example/{token}"),
            token,
            expires_at,
        })
    }
}

#[async_trait]
impl ImageCollaborator for StubUploadService {
    async fn analysis(&self, token: &str) -> Result<ImageAnalysis, CollaboratorError> {
        let mut tokens = self.tokens.lock();
        let state = tokens.get_mut(token).ok_or(CollaboratorError::UnknownToken)?;
        if state.consumed || state.expires_at < Utc::now() {
            return Ok(ImageAnalysis::Expired);
        }
        state.consumed = true;
        Ok(ImageAnalysis::Ready {
            summary: "Photo received and attached to the service ticket".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_is_single_use() {
        let service = StubUploadService::new();
        let token = service
            .send_upload_link("caller@example.com", "call-1")
            .await
            .unwrap();
        assert!(token.expires_at > Utc::now());

        assert!(matches!(
            service.analysis(&token.token).await.unwrap(),
            ImageAnalysis::Ready { .. }
        ));
        assert!(matches!(
            service.analysis(&token.token).await.unwrap(),
            ImageAnalysis::Expired
        ));
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let service = StubUploadService::new();
        assert!(matches!(
            service.analysis("nope").await.unwrap_err(),
            CollaboratorError::UnknownToken
        ));
    }
}
