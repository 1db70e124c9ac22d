//! The three user-triggered phases. Each takes the session context by `&mut` and the
//! model through `Generate`; state is written only after the phase fully succeeds.

mod diagnosis;
mod firmware;
mod impact;

pub use diagnosis::{run_diagnosis, DIAGNOSIS_PROMPT};
pub use firmware::{firmware_prompt, run_firmware, FirmwareRequest, DEFAULT_GOAL, DEFAULT_HARDWARE};
pub use impact::{
    impact_prompt, parse_impact_json, parse_impact_key_values, parse_impact_reply, run_impact,
    slice_key_values, strip_code_fence, ImpactMetrics, ImpactParseError, KeyValueSlices,
};

use crate::llm::GatewayError;

/// Shown instead of the generic error when the service rate-limits us.
pub const RATE_LIMIT_MESSAGE: &str =
    "Rate limited by the model service. Wait about 30 seconds and try again.";

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Calculation Matrix Error: {0}")]
    Impact(#[from] ImpactParseError),
    #[error("Run Phase 1 Diagnosis first.")]
    DiagnosisRequired,
}

impl PhaseError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PhaseError::Gateway(e) if e.is_rate_limited())
    }

    /// Message for the page.
    pub fn user_message(&self) -> String {
        match self {
            PhaseError::Gateway(e) if e.is_rate_limited() => RATE_LIMIT_MESSAGE.to_string(),
            PhaseError::Gateway(e) => format!("Error: {}", e),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::llm::{GatewayError, Generate};
    use crate::upload::UploadedImage;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    pub enum Reply {
        Text(String),
        Status(StatusCode),
    }

    /// Returns a fixed reply and records every prompt (and whether an image came with it).
    pub struct ScriptedGenerator {
        reply: Reply,
        pub calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedGenerator {
        pub fn text(s: &str) -> Self {
            Self {
                reply: Reply::Text(s.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn status(code: StatusCode) -> Self {
            Self {
                reply: Reply::Status(code),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> String {
            self.calls.lock().unwrap().last().unwrap().0.clone()
        }
    }

    #[async_trait]
    impl Generate for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            image: Option<&UploadedImage>,
        ) -> Result<String, GatewayError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), image.map(|i| i.mime_type.clone())));
            match &self.reply {
                Reply::Text(s) => Ok(s.clone()),
                Reply::Status(code) => Err(GatewayError::Api {
                    status: *code,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }
}
