use std::fmt;

use crate::query::QueryModality;

pub const TEXT_SEARCH_FAILED_MESSAGE: &str = "Désolé, l'analyse a échoué. Veuillez réessayer.";
pub const PHOTO_UPLOAD_FAILED_MESSAGE: &str =
    "Impossible d'identifier cette photo. Assurez-vous que la plante est bien visible.";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ContractErrorKind {
    BackendError,
    EmptyResponse,
    MalformedResponse,
    NoImageReturned,
    ValidationError,
}

impl ContractErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BackendError => "backend_error",
            Self::EmptyResponse => "empty_response",
            Self::MalformedResponse => "malformed_response",
            Self::NoImageReturned => "no_image_returned",
            Self::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ContractErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    kind: ContractErrorKind,
    message: String,
}

pub type ContractResult<T> = Result<T, ContractError>;

impl ContractError {
    pub fn new(kind: ContractErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::BackendError, message)
    }

    pub fn empty_response(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::EmptyResponse, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::MalformedResponse, message)
    }

    pub fn no_image(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::NoImageReturned, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::ValidationError, message)
    }

    pub fn from_backend_anyhow(err: &anyhow::Error) -> Self {
        Self::backend(error_chain_message(err))
    }

    pub fn kind(&self) -> ContractErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

pub fn user_facing_failure(modality: QueryModality) -> &'static str {
    match modality {
        QueryModality::TextSearch => TEXT_SEARCH_FAILED_MESSAGE,
        QueryModality::PhotoUpload => PHOTO_UPLOAD_FAILED_MESSAGE,
    }
}

pub fn error_chain_message(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return err.to_string();
    }
    parts.join(" | caused by: ")
}
