use std::collections::HashSet;
use std::thread;

use serde_json::json;
use spesflore_contracts::botany::{scientific_key, DiscoveredPlant, PlantSuggestion};
use spesflore_contracts::events::EventWriter;

use crate::backend::map_object;
use crate::client::{BotanicalClient, DEFAULT_DISCOVERY_COUNT};

pub const DEFAULT_GALLERY_LIMIT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSkip {
    Busy,
    AnalysisActive,
    LimitReached,
}

impl BatchSkip {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::AnalysisActive => "analysis_active",
            Self::LimitReached => "limit_reached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub count: usize,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GallerySnapshot {
    pub plants: Vec<DiscoveredPlant>,
    pub busy: bool,
    pub hero_image: Option<String>,
}

#[derive(Debug)]
pub struct GallerySession {
    plants: Vec<DiscoveredPlant>,
    known: HashSet<String>,
    busy: bool,
    hero_image: Option<String>,
    batch_size: usize,
    limit: usize,
}

impl Default for GallerySession {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_COUNT, DEFAULT_GALLERY_LIMIT)
    }
}

impl GallerySession {
    pub fn new(batch_size: usize, limit: usize) -> Self {
        Self {
            plants: Vec::new(),
            known: HashSet::new(),
            busy: false,
            hero_image: None,
            batch_size: batch_size.max(1),
            limit,
        }
    }

    pub fn try_begin_batch(&mut self, analysis_active: bool) -> Result<BatchPlan, BatchSkip> {
        if analysis_active {
            return Err(BatchSkip::AnalysisActive);
        }
        if self.busy {
            return Err(BatchSkip::Busy);
        }
        let remaining = self.limit.saturating_sub(self.plants.len());
        if remaining == 0 {
            return Err(BatchSkip::LimitReached);
        }
        self.busy = true;
        Ok(BatchPlan {
            count: self.batch_size.min(remaining),
            exclude: self
                .plants
                .iter()
                .map(|plant| plant.scientific.clone())
                .collect(),
        })
    }

    pub fn finish_batch(&mut self, plants: Vec<DiscoveredPlant>) -> usize {
        let before = self.plants.len();
        for plant in plants {
            if self.plants.len() >= self.limit {
                break;
            }
            if self.known.insert(scientific_key(&plant.scientific)) {
                self.plants.push(plant);
            }
        }
        self.busy = false;
        self.plants.len() - before
    }

    pub fn abort_batch(&mut self) {
        self.busy = false;
    }

    pub fn set_hero_image(&mut self, data_uri: String) {
        self.hero_image = Some(data_uri);
    }

    pub fn hero_image(&self) -> Option<&str> {
        self.hero_image.as_deref()
    }

    pub fn plants(&self) -> &[DiscoveredPlant] {
        &self.plants
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn plant(&self, selector: &str) -> Option<&DiscoveredPlant> {
        let selector = selector.trim();
        if let Ok(position) = selector.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|index| self.plants.get(index));
        }
        self.plants.iter().find(|plant| plant.id == selector)
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        GallerySnapshot {
            plants: self.plants.clone(),
            busy: self.busy,
            hero_image: self.hero_image.clone(),
        }
    }
}

/// Generates one preview per suggestion concurrently and returns the entries
/// in input order once every preview call has settled. A failed preview
/// leaves that entry without an image.
pub fn attach_previews(
    client: &BotanicalClient,
    suggestions: Vec<PlantSuggestion>,
    events: &EventWriter,
) -> Vec<DiscoveredPlant> {
    thread::scope(|scope| {
        let handles = suggestions
            .iter()
            .map(|suggestion| {
                let subject = suggestion.scientific.clone();
                scope.spawn(move || client.generate_image(&subject))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .zip(suggestions)
            .map(|(handle, suggestion)| {
                let payload = map_object(json!({ "scientific": suggestion.scientific }));
                let image = match handle.join() {
                    Ok(Ok(data_uri)) => Some(data_uri),
                    Ok(Err(err)) => {
                        events.record_error("gallery_preview_failed", &err, payload);
                        None
                    }
                    Err(_) => {
                        let mut payload = payload;
                        payload.insert("error".to_string(), json!("preview worker panicked"));
                        events.record("gallery_preview_failed", payload);
                        None
                    }
                };
                DiscoveredPlant::from_suggestion(suggestion, image)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::backend::GenerateResponse;
    use crate::client::testing::{image_reply, models, ScriptedBackend};

    use super::*;

    fn suggestion(scientific: &str) -> PlantSuggestion {
        PlantSuggestion {
            name: format!("Nom de {scientific}"),
            scientific: scientific.to_string(),
            family: "Famille".to_string(),
            description: "Une plante.".to_string(),
        }
    }

    fn plant(scientific: &str) -> DiscoveredPlant {
        DiscoveredPlant::from_suggestion(suggestion(scientific), None)
    }

    #[test]
    fn batch_is_blocked_while_busy_or_analysis_active() {
        let mut gallery = GallerySession::default();
        assert_eq!(gallery.try_begin_batch(true), Err(BatchSkip::AnalysisActive));
        assert!(!gallery.is_busy());

        let plan = gallery.try_begin_batch(false);
        assert_eq!(
            plan,
            Ok(BatchPlan {
                count: 3,
                exclude: Vec::new()
            })
        );
        assert_eq!(gallery.try_begin_batch(false), Err(BatchSkip::Busy));

        gallery.abort_batch();
        assert!(gallery.try_begin_batch(false).is_ok());
    }

    #[test]
    fn finish_batch_appends_in_order_and_excludes_next_time() {
        let mut gallery = GallerySession::default();
        let _ = gallery.try_begin_batch(false);
        let appended = gallery.finish_batch(vec![plant("Rosa canina"), plant("Ginkgo biloba")]);
        assert_eq!(appended, 2);
        assert!(!gallery.is_busy());

        let plan = gallery.try_begin_batch(false);
        assert_eq!(
            plan.map(|plan| plan.exclude),
            Ok(vec!["Rosa canina".to_string(), "Ginkgo biloba".to_string()])
        );
        let appended = gallery.finish_batch(vec![plant("rosa  CANINA"), plant("Nelumbo nucifera")]);
        assert_eq!(appended, 1);
        let names = gallery
            .plants()
            .iter()
            .map(|plant| plant.scientific.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(names, vec!["Rosa canina", "Ginkgo biloba", "Nelumbo nucifera"]);
    }

    #[test]
    fn limit_caps_batch_size_and_stops_batches() {
        let mut gallery = GallerySession::new(3, 4);
        let _ = gallery.try_begin_batch(false);
        gallery.finish_batch(vec![plant("A a"), plant("B b"), plant("C c")]);

        let plan = gallery.try_begin_batch(false);
        assert_eq!(plan.as_ref().map(|plan| plan.count), Ok(1));
        gallery.finish_batch(vec![plant("D d"), plant("E e")]);
        assert_eq!(gallery.plants().len(), 4);
        assert_eq!(gallery.try_begin_batch(false), Err(BatchSkip::LimitReached));
    }

    #[test]
    fn plant_lookup_by_position_or_id() {
        let mut gallery = GallerySession::default();
        let _ = gallery.try_begin_batch(false);
        gallery.finish_batch(vec![plant("Rosa canina"), plant("Ginkgo biloba")]);
        let id = gallery.plants()[1].id.clone();

        assert_eq!(
            gallery.plant("1").map(|plant| plant.scientific.as_str()),
            Some("Rosa canina")
        );
        assert_eq!(
            gallery.plant(&id).map(|plant| plant.scientific.as_str()),
            Some("Ginkgo biloba")
        );
        assert!(gallery.plant("0").is_none());
        assert!(gallery.plant("3").is_none());
        assert!(gallery.plant("unknown").is_none());
    }

    #[test]
    fn one_failed_preview_keeps_all_entries() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push("generate_image", Ok(image_reply("AAAA")));
        backend.push("generate_image", Err("rate limited".to_string()));
        backend.push("generate_image", Ok(image_reply("CCCC")));
        let client = BotanicalClient::new(backend.clone(), models());
        let dir = tempfile::tempdir()?;
        let events_path = dir.path().join("events.jsonl");
        let events = EventWriter::new(&events_path, "test");

        let plants = attach_previews(
            &client,
            vec![
                suggestion("Rosa canina"),
                suggestion("Ginkgo biloba"),
                suggestion("Nelumbo nucifera"),
            ],
            &events,
        );

        assert_eq!(plants.len(), 3);
        let names = plants
            .iter()
            .map(|plant| plant.scientific.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(names, vec!["Rosa canina", "Ginkgo biloba", "Nelumbo nucifera"]);
        assert_eq!(plants.iter().filter(|plant| !plant.has_preview()).count(), 1);
        let ids = plants
            .iter()
            .map(|plant| plant.id.as_str())
            .collect::<HashSet<&str>>();
        assert_eq!(ids.len(), 3);

        let log = std::fs::read_to_string(&events_path)?;
        assert_eq!(log.matches("\"gallery_preview_failed\"").count(), 1);
        assert_eq!(backend.requests().len(), 3);
        Ok(())
    }

    #[test]
    fn previews_use_scientific_names() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(
            "generate_image",
            Ok(GenerateResponse::from_text("no image here")),
        );
        let client = BotanicalClient::new(backend.clone(), models());
        let plants = attach_previews(
            &client,
            vec![suggestion("Ginkgo biloba")],
            &EventWriter::disabled("test"),
        );
        assert_eq!(plants.len(), 1);
        assert!(!plants[0].has_preview());
        let requests = backend.requests();
        assert_eq!(requests[0].metadata["subject"], "Ginkgo biloba");
    }
}
