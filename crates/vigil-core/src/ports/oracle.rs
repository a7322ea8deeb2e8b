//! Classification oracle port.
//!
//! Implementation: `vigil-network::ai_vision_client::RemoteVisionOracle`.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::verdict::{TriggerDescription, Verdict};

/// Encoded image sent to the oracle.
#[derive(Clone)]
pub struct EncodedImage {
    /// MIME type, e.g. `image/jpeg`
    pub mime_type: &'static str,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// One classification call: an image batch (oldest first) and the description.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub images: Vec<EncodedImage>,
    pub description: TriggerDescription,
}

/// Multimodal model that judges whether images match a trigger description.
#[async_trait]
pub trait TriggerOracle: Send + Sync {
    /// Classifies the request. Transport and protocol failures surface as
    /// classification errors (`Network`, `Timeout`, `RateLimit`,
    /// `ServiceUnavailable`, `ClientRequest`, `OracleResponse`).
    async fn evaluate(&self, request: &ClassificationRequest) -> Result<Verdict, CoreError>;

    /// Provider / model name for logs.
    fn provider_name(&self) -> &str;
}
