use std::env;

use anyhow::{anyhow, Result};
use spesflore_contracts::models::{Capability, ModelRegistry, ModelSpec};

pub const DEFAULT_BACKEND: &str = "gemini";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 5.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub backend: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub request_timeout_s: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            text_model: None,
            image_model: None,
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn dryrun() -> Self {
        Self {
            backend: "dryrun".to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            backend: lookup("SPESFLORE_BACKEND")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or(defaults.backend),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            api_key: lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            text_model: lookup("SPESFLORE_TEXT_MODEL"),
            image_model: lookup("SPESFLORE_IMAGE_MODEL"),
            request_timeout_s: lookup("SPESFLORE_REQUEST_TIMEOUT")
                .and_then(|value| value.parse::<f64>().ok())
                .map(clamp_timeout)
                .unwrap_or(defaults.request_timeout_s),
        }
    }

    pub fn with_request_timeout(mut self, seconds: f64) -> Self {
        self.request_timeout_s = clamp_timeout(seconds);
        self
    }

    pub fn resolve_models(&self) -> Result<ResolvedModels> {
        let registry = ModelRegistry::new(None);
        let text = select_model(
            &registry,
            &self.backend,
            self.text_model.as_deref(),
            Capability::Text,
        )?;
        // Photo identification stays on the text model when it reads images.
        let vision = if text.model.supports(Capability::Vision) {
            text.clone()
        } else {
            select_model(&registry, &self.backend, None, Capability::Vision)?
        };
        let image = select_model(
            &registry,
            &self.backend,
            self.image_model.as_deref(),
            Capability::Image,
        )?;
        Ok(ResolvedModels {
            text,
            vision,
            image,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModels {
    pub text: ModelSelection,
    pub vision: ModelSelection,
    pub image: ModelSelection,
}

impl ResolvedModels {
    pub fn fallback_notes(&self) -> Vec<(&'static str, String)> {
        let mut roles = vec![("text", &self.text), ("image", &self.image)];
        if self.vision.model != self.text.model {
            roles.push(("vision", &self.vision));
        }
        roles
            .into_iter()
            .filter_map(|(role, selection)| {
                selection
                    .fallback_reason
                    .clone()
                    .map(|reason| (role, reason))
            })
            .collect()
    }
}

fn select_model(
    registry: &ModelRegistry,
    backend: &str,
    requested: Option<&str>,
    capability: Capability,
) -> Result<ModelSelection> {
    let requested = requested.map(str::trim).filter(|value| !value.is_empty());
    let fallback_reason = match requested.map(|name| (name, registry.get(name))) {
        None => None,
        Some((name, Some(model))) if model.backend == backend && model.supports(capability) => {
            return Ok(ModelSelection {
                model: model.clone(),
                requested: Some(name.to_string()),
                fallback_reason: None,
            });
        }
        Some((name, Some(model))) if model.backend != backend => Some(format!(
            "'{name}' is served by the {} backend, not {backend}",
            model.backend
        )),
        Some((name, Some(_))) => Some(format!(
            "'{name}' cannot serve {} requests",
            capability.as_str()
        )),
        Some((name, None)) => Some(format!("'{name}' is not a known model")),
    };
    let model = registry
        .for_backend(backend)
        .by_capability(capability)
        .into_iter()
        .next()
        .ok_or_else(|| {
            anyhow!(
                "{backend} backend: no model serves {} requests",
                capability.as_str()
            )
        })?;
    Ok(ModelSelection {
        model,
        requested: requested.map(str::to_string),
        fallback_reason,
    })
}

fn clamp_timeout(seconds: f64) -> f64 {
    if !seconds.is_finite() {
        return DEFAULT_REQUEST_TIMEOUT_S;
    }
    seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
