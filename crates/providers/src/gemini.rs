use crate::sse::SseParser;
use crate::{ChatModel, RemoteModel};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatRequest, Role};
use shared::events::StreamChunk;
use shared::settings::ModelSettings;
use std::env;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Harm categories the companion opts out of blocking; the crisis screen and
/// persona prompt handle sensitive topics instead.
const UNBLOCKED_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }

    /// Reason the reply was withheld, if it was
    fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            return Some(format!("blockReason: {}", reason));
        }
        match self.finish_reason() {
            Some(reason) if reason != "STOP" && reason != "MAX_TOKENS" => {
                Some(format!("finishReason: {}", reason))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModelEntry>,
}

pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(model: &str) -> Result<Self> {
        let key = env::var("GEMINI_API_KEY").map_err(|_| anyhow!("GEMINI_API_KEY not set"))?;
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(45)).build()?,
            auth_token: key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
        })
    }

    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let auth_token = match &settings.gemini_auth.api_key {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            // Try environment variable as fallback
            _ => env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow!("No Gemini authentication configured"))?,
        };

        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(45)).build()?,
            auth_token,
            model: settings.selected_model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: settings.temperature,
        })
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .history
            .iter()
            .map(|turn| GeminiContent {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart {
                text: request.message.clone(),
            }],
        });

        GeminiRequest {
            contents,
            system_instruction: request.system_instruction.as_ref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: text.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
            safety_settings: UNBLOCKED_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.base_url, self.model, method
        )
    }

    /// Attaches the API key as a header so it never appears in a URL
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, self.auth_token.as_str())
    }

    async fn error_from_response(resp: reqwest::Response) -> anyhow::Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let detail: String = body.trim().chars().take(800).collect();
        if detail.is_empty() {
            anyhow!("gemini error: {}", status)
        } else {
            anyhow!("gemini error: {}\n{}", status, detail)
        }
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String> {
        let req = self.build_request(request);
        debug!(model = %self.model, turns = req.contents.len(), "gemini generateContent");
        let resp = self
            .authorized(self.http.post(self.endpoint("generateContent")))
            .json(&req)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: GeminiResponse = resp.json().await.map_err(transport_error)?;
        let text = body.text();
        if text.is_empty() {
            if let Some(reason) = body.block_reason() {
                return Err(anyhow!("Response blocked ({})", reason));
            }
        }
        Ok(text)
    }

    async fn generate_stream(
        &self,
        request: &ChatRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let req = self.build_request(request);
        debug!(model = %self.model, turns = req.contents.len(), "gemini streamGenerateContent");
        let resp = self
            .authorized(self.http.post(self.endpoint("streamGenerateContent")))
            .query(&[("alt", "sse")])
            .json(&req)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();
        let mut finish_reason: Option<String> = None;
        let mut produced_text = false;
        let mut blocked: Option<String> = None;

        let mut handle = |data: &str| match serde_json::from_str::<GeminiResponse>(data) {
            Ok(event) => {
                let text = event.text();
                if !text.is_empty() {
                    produced_text = true;
                    let _ = tx.send(StreamChunk::Text(text));
                }
                if let Some(reason) = event.finish_reason() {
                    finish_reason = Some(reason.to_string());
                }
                if let Some(reason) = event.block_reason() {
                    blocked = Some(reason);
                }
            }
            Err(e) => warn!("Skipping unparseable gemini stream event: {}", e),
        };

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e.without_url())));
                    return Ok(());
                }
            };
            for event in parser.feed(&bytes) {
                handle(&event.data);
            }
        }
        if let Some(event) = parser.finish() {
            handle(&event.data);
        }

        if !produced_text {
            if let Some(reason) = blocked {
                let _ = tx.send(StreamChunk::Error(format!("Response blocked ({})", reason)));
                return Ok(());
            }
        }
        let _ = tx.send(StreamChunk::Done { finish_reason });
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<RemoteModel>> {
        let url = format!("{}/v1beta/models", self.base_url);
        let resp = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: GeminiModelList = resp.json().await.map_err(transport_error)?;
        Ok(parse_model_list(body))
    }
}

/// reqwest errors carry the request URL; drop it before the error can reach
/// a log line or the screen
fn transport_error(e: reqwest::Error) -> anyhow::Error {
    anyhow::Error::new(e.without_url())
}

fn parse_model_list(body: GeminiModelList) -> Vec<RemoteModel> {
    body.models
        .into_iter()
        .map(|m| RemoteModel {
            name: m
                .name
                .strip_prefix("models/")
                .unwrap_or(&m.name)
                .to_string(),
            supported_generation_methods: m.supported_generation_methods,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::agent_api::ChatTurn;

    fn client() -> GeminiClient {
        let settings = ModelSettings {
            gemini_auth: shared::settings::ProviderAuth {
                api_key: Some("test-key".into()),
            },
            base_url: Some("http://localhost:9999/".into()),
            ..ModelSettings::default()
        };
        GeminiClient::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let client = client();
        let request = ChatRequest {
            system_instruction: Some("Be kind".into()),
            history: vec![ChatTurn::user("hi"), ChatTurn::model("hello")],
            message: "how are you?".into(),
            temperature: None,
        };
        let json = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "how are you?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be kind");
        assert!(json["systemInstruction"].get("role").is_none());
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_endpoint_uses_trimmed_base_url() {
        let client = client();
        assert_eq!(
            client.endpoint("generateContent"),
            "http://localhost:9999/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_api_key_sent_as_header() {
        let client = client();
        let request = client
            .authorized(client.http.post(client.endpoint("generateContent")))
            .build()
            .unwrap();
        assert!(request.url().query().is_none());
        assert_eq!(request.headers()[API_KEY_HEADER], "test-key");
    }

    #[tokio::test]
    async fn test_connection_error_does_not_reveal_key() {
        let settings = ModelSettings {
            gemini_auth: shared::settings::ProviderAuth {
                api_key: Some("SECRET-KEY-123".into()),
            },
            base_url: Some("http://127.0.0.1:9".into()),
            ..ModelSettings::default()
        };
        let client = GeminiClient::from_settings(&settings).unwrap();
        let request = ChatRequest {
            message: "hi".into(),
            ..ChatRequest::default()
        };

        let err = client.generate(&request).await.unwrap_err();
        let shown = shared::CompanionError::Provider(err).user_message();
        assert!(!shown.contains("SECRET-KEY-123"), "{}", shown);

        let err = client.list_models().await.unwrap_err();
        assert!(!format!("{:#}", err).contains("SECRET-KEY-123"));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(body.text(), "Hello");
        assert!(body.block_reason().is_none());
    }

    #[test]
    fn test_blocked_response() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
        )
        .unwrap();
        assert_eq!(body.text(), "");
        assert_eq!(body.block_reason().as_deref(), Some("finishReason: SAFETY"));

        let body: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap();
        assert_eq!(body.block_reason().as_deref(), Some("blockReason: OTHER"));
    }

    #[test]
    fn test_model_list_strips_prefix() {
        let body: GeminiModelList = serde_json::from_str(
            r#"{"models":[
                {"name":"models/gemini-1.5-pro","supportedGenerationMethods":["generateContent","countTokens"]},
                {"name":"models/embedding-001","supportedGenerationMethods":["embedContent"]}
            ]}"#,
        )
        .unwrap();
        let models = parse_model_list(body);
        assert_eq!(models[0].name, "gemini-1.5-pro");
        assert_eq!(models[1].supported_generation_methods, vec!["embedContent"]);
    }
}
