use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use spesflore_contracts::errors::{ContractError, ContractResult};
use spesflore_contracts::events::EventWriter;
use spesflore_contracts::query::Query;
use uuid::Uuid;

use crate::analysis::{AnalysisSession, AnalysisSnapshot, Resolution, SessionTicket};
use crate::backend::{map_object, BackendRegistry, GenerativeBackend};
use crate::client::{BotanicalClient, ClientModels, DEFAULT_DISCOVERY_COUNT, HERO_IMAGE_SUBJECT};
use crate::config::BackendConfig;
use crate::dryrun::DryrunBackend;
use crate::gallery::{
    attach_previews, BatchSkip, GallerySession, GallerySnapshot, DEFAULT_GALLERY_LIMIT,
};
use crate::gemini::GeminiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    ScrollToTop,
    AnalysisChanged,
    GalleryChanged,
    HeroImageReady,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub config: BackendConfig,
    pub events_path: Option<PathBuf>,
    pub batch_size: usize,
    pub gallery_limit: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config: BackendConfig::default(),
            events_path: None,
            batch_size: DEFAULT_DISCOVERY_COUNT,
            gallery_limit: DEFAULT_GALLERY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Skipped(BatchSkip),
    Failed,
    Appended(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOutcome {
    pub hero_ready: bool,
    pub batch: BatchOutcome,
}

/// Cloning is cheap and every clone sees the same sessions. Locks are only
/// held to read or apply a transition, never across a backend call, and the
/// two sessions are never locked together.
#[derive(Clone)]
pub struct Spesflore {
    client: BotanicalClient,
    analysis: Arc<Mutex<AnalysisSession>>,
    gallery: Arc<Mutex<GallerySession>>,
    events: EventWriter,
    signals: Option<Sender<SurfaceSignal>>,
}

impl Spesflore {
    pub fn new(options: AppOptions) -> Result<Self> {
        let config = &options.config;
        let mut registry = BackendRegistry::new();
        registry.register(GeminiBackend::new(config)?);
        registry.register(DryrunBackend);
        let backend = registry.get(&config.backend).ok_or_else(|| {
            anyhow!(
                "unknown backend '{}' (available: {})",
                config.backend,
                registry.names().join(", ")
            )
        })?;
        let models = config.resolve_models()?;

        let instance_id = Uuid::new_v4().to_string();
        let events = match options.events_path.as_ref() {
            Some(path) => EventWriter::new(path, instance_id),
            None => EventWriter::disabled(instance_id),
        };
        for (role, reason) in models.fallback_notes() {
            events.record(
                "model_fallback",
                map_object(json!({ "role": role, "reason": reason })),
            );
        }
        let client_models = ClientModels::from(&models);
        events.record(
            "app_started",
            map_object(json!({
                "backend": backend.name(),
                "text_model": client_models.text,
                "vision_model": client_models.vision,
                "image_model": client_models.image,
                "batch_size": options.batch_size,
                "gallery_limit": options.gallery_limit,
            })),
        );

        Ok(Self::with_backend(
            backend,
            client_models,
            events,
            GallerySession::new(options.batch_size, options.gallery_limit),
        ))
    }

    pub fn with_backend(
        backend: Arc<dyn GenerativeBackend>,
        models: ClientModels,
        events: EventWriter,
        gallery: GallerySession,
    ) -> Self {
        Self {
            client: BotanicalClient::new(backend, models),
            analysis: Arc::new(Mutex::new(AnalysisSession::new())),
            gallery: Arc::new(Mutex::new(gallery)),
            events,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: Sender<SurfaceSignal>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn client(&self) -> &BotanicalClient {
        &self.client
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn analysis_snapshot(&self) -> AnalysisSnapshot {
        lock(&self.analysis).snapshot()
    }

    pub fn gallery_snapshot(&self) -> GallerySnapshot {
        lock(&self.gallery).snapshot()
    }

    pub fn submit(&self, query: Query) -> ContractResult<SessionTicket> {
        let ticket = lock(&self.analysis).begin(query)?;
        let mut payload = map_object(json!({
            "token": ticket.token,
            "modality": ticket.query.modality().as_str(),
        }));
        if let Some(text) = ticket.query.display_text() {
            payload.insert("query".to_string(), Value::String(text.to_string()));
        }
        self.events.record("analysis_started", payload);
        self.signal(SurfaceSignal::ScrollToTop);
        self.signal(SurfaceSignal::AnalysisChanged);
        Ok(ticket)
    }

    pub fn run_identification(&self, ticket: SessionTicket) -> Resolution {
        let result = self.client.identify(&ticket.query);
        let outcome = match &result {
            Ok(record) => Ok(record.scientific_name.clone()),
            Err(err) => Err(err.clone()),
        };
        let resolution = lock(&self.analysis).resolve(ticket.token, result);

        let modality = ticket.query.modality().as_str();
        match (resolution, outcome) {
            (Resolution::Stale, _) => self.events.record(
                "analysis_stale_result",
                map_object(json!({ "token": ticket.token, "modality": modality })),
            ),
            (Resolution::Applied, Ok(scientific)) => {
                self.events.record(
                    "analysis_succeeded",
                    map_object(json!({
                        "token": ticket.token,
                        "modality": modality,
                        "scientific": scientific,
                    })),
                );
                self.signal(SurfaceSignal::AnalysisChanged);
            }
            (Resolution::Applied, Err(err)) => {
                self.events.record_error(
                    "analysis_failed",
                    &err,
                    map_object(json!({ "token": ticket.token, "modality": modality })),
                );
                self.signal(SurfaceSignal::AnalysisChanged);
            }
        }
        resolution
    }

    pub fn spawn_identification(&self, ticket: SessionTicket) -> JoinHandle<Resolution> {
        let app = self.clone();
        thread::spawn(move || app.run_identification(ticket))
    }

    pub fn search(&self, query: Query) -> ContractResult<JoinHandle<Resolution>> {
        let ticket = self.submit(query)?;
        Ok(self.spawn_identification(ticket))
    }

    pub fn search_blocking(&self, query: Query) -> ContractResult<Resolution> {
        let ticket = self.submit(query)?;
        Ok(self.run_identification(ticket))
    }

    pub fn reset(&self) -> bool {
        let (changed, token) = {
            let mut analysis = lock(&self.analysis);
            let changed = analysis.reset();
            (changed, analysis.token())
        };
        if changed {
            self.events
                .record("analysis_reset", map_object(json!({ "token": token })));
            self.signal(SurfaceSignal::AnalysisChanged);
        }
        changed
    }

    pub fn select_gallery_plant(&self, selector: &str) -> ContractResult<JoinHandle<Resolution>> {
        let scientific = lock(&self.gallery)
            .plant(selector)
            .map(|plant| plant.scientific.clone())
            .ok_or_else(|| {
                ContractError::validation(format!("no gallery plant matches '{}'", selector.trim()))
            })?;
        self.search(Query::text(scientific))
    }

    pub fn load_hero_image(&self) -> bool {
        match self.client.generate_image(HERO_IMAGE_SUBJECT) {
            Ok(data_uri) => {
                lock(&self.gallery).set_hero_image(data_uri);
                self.events
                    .record("hero_image_ready", map_object(json!({})));
                self.signal(SurfaceSignal::HeroImageReady);
                true
            }
            Err(err) => {
                self.events
                    .record_error("hero_image_failed", &err, map_object(json!({})));
                false
            }
        }
    }

    pub fn request_more_gallery(&self) -> BatchOutcome {
        self.run_batch(true)
    }

    fn run_batch(&self, respect_analysis: bool) -> BatchOutcome {
        let analysis_active = respect_analysis && lock(&self.analysis).is_active();
        let plan = match lock(&self.gallery).try_begin_batch(analysis_active) {
            Ok(plan) => plan,
            Err(skip) => {
                self.events.record(
                    "gallery_batch_skipped",
                    map_object(json!({ "reason": skip.as_str() })),
                );
                return BatchOutcome::Skipped(skip);
            }
        };
        self.events.record(
            "gallery_batch_started",
            map_object(json!({ "count": plan.count, "exclude": plan.exclude })),
        );

        let suggestions = match self.client.discover_plants(plan.count, &plan.exclude) {
            Ok(suggestions) => suggestions,
            Err(err) => {
                lock(&self.gallery).abort_batch();
                self.events
                    .record_error("gallery_discovery_failed", &err, map_object(json!({})));
                self.signal(SurfaceSignal::GalleryChanged);
                return BatchOutcome::Failed;
            }
        };
        let plants = attach_previews(&self.client, suggestions, &self.events);
        let previews = plants.iter().filter(|plant| plant.has_preview()).count();
        let appended = lock(&self.gallery).finish_batch(plants);
        self.events.record(
            "gallery_batch_finished",
            map_object(json!({ "appended": appended, "previews": previews })),
        );
        self.signal(SurfaceSignal::GalleryChanged);
        BatchOutcome::Appended(appended)
    }

    pub fn spawn_request_more_gallery(&self) -> JoinHandle<BatchOutcome> {
        let app = self.clone();
        thread::spawn(move || app.request_more_gallery())
    }

    pub fn mount(&self) -> MountOutcome {
        thread::scope(|scope| {
            let hero = scope.spawn(|| self.load_hero_image());
            let batch = self.run_batch(false);
            MountOutcome {
                hero_ready: hero.join().unwrap_or(false),
                batch,
            }
        })
    }

    pub fn spawn_mount(&self) -> JoinHandle<MountOutcome> {
        let app = self.clone();
        thread::spawn(move || app.mount())
    }

    fn signal(&self, signal: SurfaceSignal) {
        if let Some(signals) = self.signals.as_ref() {
            // A closed surface just stops listening.
            let _ = signals.send(signal);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
