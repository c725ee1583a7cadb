pub mod analysis;
pub mod app;
pub mod backend;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod gallery;
pub mod gemini;

pub use analysis::{AnalysisPhase, AnalysisSession, AnalysisSnapshot, Resolution, SessionTicket};
pub use app::{AppOptions, BatchOutcome, MountOutcome, Spesflore, SurfaceSignal};
pub use backend::{
    BackendRegistry, ContentPart, GenerateRequest, GenerateResponse, GenerativeBackend,
    ResponseFormat,
};
pub use client::{BotanicalClient, ClientModels};
pub use config::BackendConfig;
pub use gallery::{BatchSkip, GallerySession, GallerySnapshot};
