use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::backend::{
    response_json_or_error, ContentPart, GenerateRequest, GenerateResponse, GenerativeBackend,
    ResponseFormat,
};
use crate::config::BackendConfig;

pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs_f64(config.request_timeout_s))
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_parts(parts: &[ContentPart]) -> Vec<Value> {
        parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "text": text }),
                ContentPart::InlineData { mime_type, data } => json!({
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": data,
                    }
                }),
            })
            .collect()
    }

    fn build_payload(request: &GenerateRequest) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            Value::Array(vec![json!({
                "role": "user",
                "parts": Self::build_parts(&request.parts),
            })]),
        );
        if let Some(instruction) = request
            .system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }

        let generation_config = match &request.response_format {
            ResponseFormat::Json { schema } => json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }),
            ResponseFormat::Image { aspect_ratio } => json!({
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": aspect_ratio },
            }),
        };
        payload.insert("generationConfig".to_string(), generation_config);
        Value::Object(payload)
    }

    fn parse_response(response_payload: &Value) -> GenerateResponse {
        let Some(candidate) = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
        else {
            return GenerateResponse::default();
        };

        let parts: Vec<ContentPart> = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Self::parse_part).collect())
            .unwrap_or_default();
        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(str::to_string);
        GenerateResponse {
            parts,
            finish_reason,
        }
    }

    fn parse_part(part: &Value) -> Option<ContentPart> {
        if let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        {
            let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Some(ContentPart::InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            });
        }
        // Thought summaries are not part of the answer body.
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            return None;
        }
        part.get("text")
            .and_then(Value::as_str)
            .map(|text| ContentPart::Text(text.to_string()))
    }
}

impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Ok(Self::parse_response(&response_payload))
    }
}
