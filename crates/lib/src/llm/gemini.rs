//! Gemini API client (https://generativelanguage.googleapis.com/v1beta by default).
//! Supports listing models and non-streaming generateContent with an optional inline image.

use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::upload::UploadedImage;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Generation method a model must advertise to be usable here.
pub const GENERATE_CONTENT: &str = "generateContent";

const LIST_PAGE_SIZE: u32 = 1000;

/// Header carrying the API key. Keeps the key out of request URLs (and so out of error text).
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gemini request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("gemini api error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("gemini returned no text")]
    EmptyReply,
}

impl GatewayError {
    /// True when the service refused the call for quota reasons (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GatewayError::Api { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Request(e) => e.status() == Some(StatusCode::TOO_MANY_REQUESTS),
            GatewayError::EmptyReply => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Request(e.without_url())
    }
}

/// Canonical `models/<id>` form used by the API for model names.
pub fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

impl GeminiClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>, timeout: Option<Duration>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().unwrap_or_else(|e| {
            log::warn!("http client setup failed ({}); using defaults without the request timeout", e);
            reqwest::Client::new()
        });
        Self {
            base_url,
            api_key: api_key.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /models: list every model, following nextPageToken until exhausted.
    pub async fn list_models(&self) -> Result<Vec<GeminiModel>, GatewayError> {
        let url = format!("{}/models", self.base_url);
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", LIST_PAGE_SIZE)]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let res = req.send().await?;
            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                return Err(GatewayError::Api {
                    status,
                    message: api_error_message(&body),
                });
            }
            let data: ListModelsResponse = res.json().await?;
            out.extend(data.models.unwrap_or_default());
            match data.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    /// POST /{model}:generateContent with parts are `[text]` or `[text, inlineData]`. Returns the joined reply text.
    pub async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&UploadedImage>,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/{}:generateContent", self.base_url, model_path(model));
        let mut parts = vec![RequestPart::Text {
            text: prompt.to_string(),
        }];
        if let Some(img) = image {
            parts.push(RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: img.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&img.bytes),
                },
            });
        }
        let body = GenerateRequest {
            contents: vec![RequestContent { parts }],
        };
        let res = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status,
                message: api_error_message(&body),
            });
        }
        let data: GenerateResponse = res.json().await?;
        data.text().ok_or(GatewayError::EmptyReply)
    }
}

/// Prefer `error.message` from the Google error envelope; otherwise the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModel {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl GeminiModel {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    models: Option<Vec<GeminiModel>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate (all text parts concatenated), if any.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let mut out = String::new();
        let mut any = false;
        for part in &content.parts {
            if let Some(ref t) = part.text {
                out.push_str(t);
                any = true;
            }
        }
        any.then_some(out)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::HeaderMap, routing::get, Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ListCalls {
        page_tokens: Arc<Mutex<Vec<Option<String>>>>,
        keys: Arc<Mutex<Vec<Option<String>>>>,
        query_keys: Arc<Mutex<Vec<Option<String>>>>,
    }

    async fn two_page_list(
        axum::extract::State(calls): axum::extract::State<ListCalls>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        let token = q.get("pageToken").cloned();
        calls.page_tokens.lock().unwrap().push(token.clone());
        calls.keys.lock().unwrap().push(
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        calls.query_keys.lock().unwrap().push(q.get("key").cloned());
        let page = match token.as_deref() {
            None => serde_json::json!({
                "models": [{ "name": "models/a", "supportedGenerationMethods": ["generateContent"] }],
                "nextPageToken": "page-2"
            }),
            _ => serde_json::json!({
                "models": [{ "name": "models/b", "supportedGenerationMethods": ["generateContent"] }]
            }),
        };
        Json(page)
    }

    async fn start_list_mock(calls: ListCalls) -> String {
        let app = Router::new()
            .route("/models", get(two_page_list))
            .with_state(calls);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn list_models_follows_next_page_token() {
        let calls = ListCalls::default();
        let base = start_list_mock(calls.clone()).await;
        let client = GeminiClient::new(Some(base), "list-key", None);
        let names: Vec<String> = client
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["models/a", "models/b"]);
        assert_eq!(
            *calls.page_tokens.lock().unwrap(),
            vec![None, Some("page-2".to_string())]
        );
        assert_eq!(
            *calls.keys.lock().unwrap(),
            vec![Some("list-key".to_string()), Some("list-key".to_string())]
        );
        assert_eq!(*calls.query_keys.lock().unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn transport_error_does_not_expose_api_key() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = GeminiClient::new(
            Some(format!("http://127.0.0.1:{}", port)),
            "SECRET_KEY_123",
            None,
        );
        let err = client
            .generate_content("models/x", "hello", None)
            .await
            .err()
            .expect("closed port must fail");
        assert!(matches!(err, GatewayError::Request(_)));
        let message = crate::phases::PhaseError::Gateway(err).user_message();
        assert!(message.starts_with("Error: gemini request failed"));
        assert!(!message.contains("SECRET_KEY_123"), "{}", message);

        let err = client.list_models().await.err().expect("closed port must fail");
        assert!(!format!("{} {:?}", err, err).contains("SECRET_KEY_123"));
    }

    #[test]
    fn model_path_adds_prefix_once() {
        assert_eq!(model_path("gemini-1.5-flash"), "models/gemini-1.5-flash");
        assert_eq!(model_path(" models/gemini-pro "), "models/gemini-pro");
    }

    #[test]
    fn request_parts_serialize_in_api_shape() {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: "hi".into() },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".into(),
                            data: "AAAA".into(),
                        },
                    },
                ],
            }],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "contents": [{ "parts": [
                    { "text": "hi" },
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                ]}]
            })
        );
    }

    #[test]
    fn reply_text_joins_parts_of_first_candidate() {
        let data: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}},{"content":{"parts":[{"text":"z"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(data.text().as_deref(), Some("ab"));
    }

    #[test]
    fn reply_without_text_is_none() {
        let data: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(data.text().is_none());
        let data: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(data.text().is_none());
    }

    #[test]
    fn models_filter_on_generate_content() {
        let list: ListModelsResponse = serde_json::from_str(
            r#"{"models":[
                {"name":"models/embedding-001","supportedGenerationMethods":["embedContent"]},
                {"name":"models/gemini-1.5-flash","supportedGenerationMethods":["generateContent","countTokens"]}
            ],"nextPageToken":""}"#,
        )
        .unwrap();
        let models = list.models.unwrap();
        assert!(!models[0].supports_generate_content());
        assert!(models[1].supports_generate_content());
    }

    #[test]
    fn rate_limit_is_classified_by_status() {
        let limited = GatewayError::Api {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Resource has been exhausted".into(),
        };
        assert!(limited.is_rate_limited());
        let other = GatewayError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "code 429 in message only".into(),
        };
        assert!(!other.is_rate_limited());
        assert!(!GatewayError::EmptyReply.is_rate_limited());
    }

    #[test]
    fn api_error_message_prefers_envelope() {
        assert_eq!(
            api_error_message(r#"{"error":{"code":403,"message":"API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(api_error_message(" plain failure \n"), "plain failure");
    }
}
