//! Model gateway: Gemini client, model selection, and the `Generate` seam used by the phases.
//!
//! The gateway resolves one model at startup and keeps it for the life of the process.

mod gemini;
mod select;

pub use gemini::{model_path, GatewayError, GeminiClient, GeminiModel, DEFAULT_BASE_URL, GENERATE_CONTENT};
pub use select::{generation_capable, select_model};

use crate::upload::UploadedImage;
use async_trait::async_trait;
use serde::Serialize;

/// The remote model the gateway selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelHandle {
    pub name: String,
}

/// One generate call against the selected model. Implemented by `ModelGateway`; phases only see this.
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        image: Option<&UploadedImage>,
    ) -> Result<String, GatewayError>;
}

/// Gemini client bound to a selected model.
#[derive(Clone)]
pub struct ModelGateway {
    client: GeminiClient,
    model: ModelHandle,
}

impl ModelGateway {
    /// List models, keep generation-capable ones, and pick by priority.
    /// Returns `Ok(None)` when the service lists no usable model.
    pub async fn connect<P: AsRef<str>>(
        client: GeminiClient,
        priority: &[P],
    ) -> Result<Option<Self>, GatewayError> {
        let models = client.list_models().await?;
        let capable = generation_capable(&models);
        log::debug!(
            "gemini lists {} model(s), {} support {}",
            models.len(),
            capable.len(),
            GENERATE_CONTENT
        );
        let Some(name) = select_model(priority, capable.as_slice()) else {
            return Ok(None);
        };
        log::info!("selected model {}", name);
        Ok(Some(Self {
            client,
            model: ModelHandle { name },
        }))
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }
}

#[async_trait]
impl Generate for ModelGateway {
    async fn generate(
        &self,
        prompt: &str,
        image: Option<&UploadedImage>,
    ) -> Result<String, GatewayError> {
        log::debug!(
            "generate on {} (prompt {} chars, image: {})",
            self.model.name,
            prompt.chars().count(),
            image.is_some()
        );
        self.client
            .generate_content(&self.model.name, prompt, image)
            .await
    }
}
