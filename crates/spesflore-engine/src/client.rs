use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use spesflore_contracts::botany::{scientific_key, BotanicalRecord, PlantSuggestion};
use spesflore_contracts::errors::{ContractError, ContractResult};
use spesflore_contracts::query::Query;
use spesflore_contracts::schema::{botanical_record_schema, discovery_schema};

use crate::backend::{
    map_object, truncate_text, ContentPart, GenerateRequest, GenerateResponse, GenerativeBackend,
    ResponseFormat,
};
use crate::config::ResolvedModels;

pub const DEFAULT_DISCOVERY_COUNT: usize = 3;
pub const IMAGE_ASPECT_RATIO: &str = "1:1";
pub const HERO_IMAGE_SUBJECT: &str = "A breathtaking lush tropical botanical garden with diverse exotic plants, sunlight filtering through leaves, 8k resolution, cinematic atmosphere";

const BOTANIST_INSTRUCTION: &str = "Tu es Spesflore AI, un expert botaniste mondial. Tu fournis des analyses précises sur l'appareil végétatif (racine, tige, feuilles) et reproducteur (fleur, fruit, inflorescence, ovaire). Tu génères également des schémas SVG propres et pédagogiques pour les diagrammes floraux et les coupes botaniques. Tes SVG doivent avoir une largeur de 400px et une hauteur de 400px, avec des lignes noires sur fond blanc ou transparent, et des légendes textuelles incluses dans le SVG.";
const PHOTO_PROMPT: &str = "Identifie cette plante et fournis des détails botaniques complets en français (appareil végétatif, reproducteur, diagramme floral, etc.).";
const CURATOR_INSTRUCTION: &str = "Tu es un conservateur de jardin botanique. Propose des espèces variées, rares ou communes, avec leur nom commun en français, leur nom scientifique, leur famille et une brève description captivante.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientModels {
    pub text: String,
    pub vision: String,
    pub image: String,
}

impl From<&ResolvedModels> for ClientModels {
    fn from(models: &ResolvedModels) -> Self {
        Self {
            text: models.text.model.name.clone(),
            vision: models.vision.model.name.clone(),
            image: models.image.model.name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BotanicalClient {
    backend: Arc<dyn GenerativeBackend>,
    models: ClientModels,
}

impl BotanicalClient {
    pub fn new(backend: Arc<dyn GenerativeBackend>, models: ClientModels) -> Self {
        Self { backend, models }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn models(&self) -> &ClientModels {
        &self.models
    }

    pub fn identify(&self, query: &Query) -> ContractResult<BotanicalRecord> {
        query.validate()?;
        let request = self.identify_request(query);
        let response = self.call(&request)?;
        let Some(text) = response.text() else {
            return Err(ContractError::empty_response("Aucune réponse du modèle."));
        };
        parse_botanical_record(&text)
    }

    pub fn generate_image(&self, subject: &str) -> ContractResult<String> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ContractError::validation("image subject is empty"));
        }
        let request = self.image_request(subject);
        let response = self.call(&request)?;
        response
            .first_image_data_uri()
            .ok_or_else(|| ContractError::no_image(format!("no image part returned for '{subject}'")))
    }

    pub fn discover_plants(
        &self,
        count: usize,
        exclude_names: &[String],
    ) -> ContractResult<Vec<PlantSuggestion>> {
        if count == 0 {
            return Err(ContractError::validation("discovery count must be positive"));
        }
        let request = self.discovery_request(count, exclude_names);
        let response = self.call(&request)?;
        let Some(text) = response.text() else {
            return Ok(Vec::new());
        };
        parse_discovery(&text, count, exclude_names)
    }

    fn call(&self, request: &GenerateRequest) -> ContractResult<GenerateResponse> {
        self.backend
            .generate(request)
            .map_err(|err| ContractError::from_backend_anyhow(&err))
    }

    pub(crate) fn identify_request(&self, query: &Query) -> GenerateRequest {
        let (model, parts, metadata) = match query {
            Query::Text(text) => (
                self.models.text.clone(),
                vec![ContentPart::text(format!(
                    "Analyse cette plante : {}. Fournis des détails botaniques complets en français.",
                    text.trim()
                ))],
                json!({
                    "operation": "identify",
                    "modality": "text",
                    "query_text": text.trim(),
                }),
            ),
            Query::Image { bytes, mime_type } => (
                self.models.vision.clone(),
                vec![
                    ContentPart::inline_bytes(bytes, mime_type.trim()),
                    ContentPart::text(PHOTO_PROMPT),
                ],
                json!({
                    "operation": "identify",
                    "modality": "photo",
                }),
            ),
        };
        GenerateRequest {
            model,
            parts,
            system_instruction: Some(BOTANIST_INSTRUCTION.to_string()),
            response_format: ResponseFormat::Json {
                schema: botanical_record_schema(),
            },
            metadata: map_object(metadata),
        }
    }

    pub(crate) fn image_request(&self, subject: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.models.image.clone(),
            parts: vec![ContentPart::text(format!(
                "A high-quality, ultra-realistic macro photographic close-up of the plant: {subject}. Professional botanical photography style, natural lighting, soft blurred background. Show the flowers or striking leaves."
            ))],
            system_instruction: None,
            response_format: ResponseFormat::Image {
                aspect_ratio: IMAGE_ASPECT_RATIO.to_string(),
            },
            metadata: map_object(json!({
                "operation": "generate_image",
                "subject": subject,
            })),
        }
    }

    pub(crate) fn discovery_request(&self, count: usize, exclude_names: &[String]) -> GenerateRequest {
        let mut prompt = format!(
            "Génère une liste de {count} plantes intéressantes (fleurs, arbres, plantes tropicales)"
        );
        if exclude_names.is_empty() {
            prompt.push('.');
        } else {
            prompt.push_str(&format!(" différentes de : {}.", exclude_names.join(", ")));
        }
        let mut metadata = Map::new();
        metadata.insert("operation".to_string(), json!("discover"));
        metadata.insert("count".to_string(), json!(count));
        metadata.insert("exclude".to_string(), json!(exclude_names));
        GenerateRequest {
            model: self.models.text.clone(),
            parts: vec![ContentPart::text(prompt)],
            system_instruction: Some(CURATOR_INSTRUCTION.to_string()),
            response_format: ResponseFormat::Json {
                schema: discovery_schema(),
            },
            metadata,
        }
    }
}

pub fn parse_botanical_record(text: &str) -> ContractResult<BotanicalRecord> {
    let record: BotanicalRecord = serde_json::from_str(text).map_err(|err| {
        ContractError::malformed(format!(
            "identification body does not match the record shape: {err} ({})",
            truncate_text(text.trim(), 120)
        ))
    })?;
    let blank = record.blank_fields();
    if !blank.is_empty() {
        return Err(ContractError::malformed(format!(
            "identification body has blank fields: {}",
            blank.join(", ")
        )));
    }
    Ok(record)
}

pub fn parse_discovery(
    text: &str,
    count: usize,
    exclude_names: &[String],
) -> ContractResult<Vec<PlantSuggestion>> {
    let rows: Vec<Value> = serde_json::from_str(text).map_err(|err| {
        ContractError::malformed(format!("discovery body is not a JSON array: {err}"))
    })?;
    let mut seen = exclude_names
        .iter()
        .map(|name| scientific_key(name))
        .collect::<HashSet<String>>();
    let mut out = Vec::new();
    for row in rows {
        let Ok(suggestion) = serde_json::from_value::<PlantSuggestion>(row) else {
            continue;
        };
        if !suggestion.is_complete() || !seen.insert(suggestion.scientific_key()) {
            continue;
        }
        out.push(suggestion);
        if out.len() == count {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};

    use super::*;

    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        replies: Mutex<Vec<(String, VecDeque<Result<GenerateResponse, String>>)>>,
        pub(crate) seen: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn push(&self, operation: &str, reply: Result<GenerateResponse, String>) {
            let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());
            if let Some((_, queue)) = replies.iter_mut().find(|(name, _)| name == operation) {
                queue.push_back(reply);
                return;
            }
            replies.push((operation.to_string(), VecDeque::from([reply])));
        }

        pub(crate) fn requests(&self) -> Vec<GenerateRequest> {
            self.seen
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .clone()
        }
    }

    impl GenerativeBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
            self.seen
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .push(request.clone());
            let operation = request.operation().unwrap_or_default().to_string();
            let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());
            let reply = replies
                .iter_mut()
                .find(|(name, _)| *name == operation)
                .and_then(|(_, queue)| queue.pop_front())
                .ok_or_else(|| anyhow!("no scripted reply for '{operation}'"))?;
            reply.map_err(|message| anyhow!(message))
        }
    }

    pub(crate) fn models() -> ClientModels {
        ClientModels {
            text: "text-model".to_string(),
            vision: "vision-model".to_string(),
            image: "image-model".to_string(),
        }
    }

    pub(crate) fn image_reply(data: &str) -> GenerateResponse {
        GenerateResponse {
            parts: vec![ContentPart::InlineData {
                mime_type: "image/png".to_string(),
                data: data.to_string(),
            }],
            finish_reason: Some("STOP".to_string()),
        }
    }

    pub(crate) fn suggestion_json(scientific: &str) -> Value {
        json!({
            "name": format!("Nom de {scientific}"),
            "scientific": scientific,
            "family": "Famille",
            "description": "Une plante.",
        })
    }

    pub(crate) fn record_json(common_name: &str) -> String {
        let svg = "<svg width=\"400\" height=\"400\"></svg>";
        json!({
            "commonName": common_name,
            "scientificName": format!("{common_name} officinalis"),
            "family": "Testaceae",
            "vegetativeApparatus": { "root": "r", "stem": "s", "leaves": "l" },
            "reproductiveApparatus": {
                "flower": "f",
                "fruit": "fr",
                "inflorescence": { "description": "d", "parts": ["a", "b"] },
                "ovary": { "description": "o", "sectionDetails": "sd" },
            },
            "floralFormula": "K5 C5",
            "floralDiagramSVG": svg,
            "inflorescenceSVG": svg,
            "ovarySectionSVG": svg,
        })
        .to_string()
    }
}
