use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn inline_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::InlineData {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::InlineData { .. } => None,
        }
    }

    pub fn data_uri(&self) -> Option<String> {
        match self {
            Self::InlineData { mime_type, data } if !data.trim().is_empty() => {
                let mime = if mime_type.trim().is_empty() {
                    "image/png"
                } else {
                    mime_type.trim()
                };
                Some(format!("data:{mime};base64,{}", data.trim()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Json { schema: Value },
    Image { aspect_ratio: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub system_instruction: Option<String>,
    pub response_format: ResponseFormat,
    pub metadata: Map<String, Value>,
}

impl GenerateRequest {
    pub fn operation(&self) -> Option<&str> {
        self.metadata.get("operation").and_then(Value::as_str)
    }

    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<&str>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub parts: Vec<ContentPart>,
    pub finish_reason: Option<String>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(text)],
            finish_reason: Some("STOP".to_string()),
        }
    }

    pub fn text(&self) -> Option<String> {
        let joined = self
            .parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<String>();
        if joined.trim().is_empty() {
            return None;
        }
        Some(joined)
    }

    pub fn first_image_data_uri(&self) -> Option<String> {
        self.parts.iter().find_map(ContentPart::data_uri)
    }
}

pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn GenerativeBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: GenerativeBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Arc::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerativeBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

pub(crate) fn response_json_or_error(backend: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{backend} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{backend} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{backend} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedBackend(&'static str);

    impl GenerativeBackend for NamedBackend {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::default())
        }
    }

    #[test]
    fn response_text_joins_parts_and_ignores_blank() {
        let response = GenerateResponse {
            parts: vec![
                ContentPart::text("{\"a\":"),
                ContentPart::inline_bytes(b"png", "image/png"),
                ContentPart::text("1}"),
            ],
            finish_reason: None,
        };
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
        assert_eq!(GenerateResponse::from_text("  \n").text(), None);
        assert_eq!(GenerateResponse::default().text(), None);
    }

    #[test]
    fn first_image_uses_declared_mime_or_png() {
        let response = GenerateResponse {
            parts: vec![
                ContentPart::text("voici"),
                ContentPart::InlineData {
                    mime_type: String::new(),
                    data: String::new(),
                },
                ContentPart::InlineData {
                    mime_type: String::new(),
                    data: "QUJD".to_string(),
                },
                ContentPart::inline_bytes(b"ABC", "image/jpeg"),
            ],
            finish_reason: None,
        };
        assert_eq!(
            response.first_image_data_uri().as_deref(),
            Some("data:image/png;base64,QUJD")
        );
        let jpeg = ContentPart::inline_bytes(b"ABC", "image/jpeg");
        assert_eq!(
            jpeg.data_uri().as_deref(),
            Some("data:image/jpeg;base64,QUJD")
        );
    }

    #[test]
    fn registry_lists_backends_by_name() {
        let mut registry = BackendRegistry::new();
        registry.register(NamedBackend("gemini"));
        registry.register(NamedBackend("dryrun"));
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
