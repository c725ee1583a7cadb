use std::sync::Arc;

use spesflore_contracts::botany::BotanicalRecord;
use spesflore_contracts::errors::{user_facing_failure, ContractResult};
use spesflore_contracts::query::{Query, QueryModality};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisPhase {
    Idle,
    Loading,
    Success(Arc<BotanicalRecord>),
    Error(String),
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }

    pub fn record(&self) -> Option<&BotanicalRecord> {
        match self {
            Self::Success(record) => Some(record.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub token: u64,
    pub query: Arc<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSnapshot {
    pub token: u64,
    pub phase: AnalysisPhase,
    pub query: Option<Arc<Query>>,
}

impl AnalysisSnapshot {
    pub fn modality(&self) -> Option<QueryModality> {
        self.query.as_deref().map(Query::modality)
    }
}

/// Every accepted submission and every effective reset bumps the token, so a
/// result that comes back for an older token is discarded.
#[derive(Debug)]
pub struct AnalysisSession {
    token: u64,
    phase: AnalysisPhase,
    query: Option<Arc<Query>>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self {
            token: 0,
            phase: AnalysisPhase::Idle,
            query: None,
        }
    }

    pub fn begin(&mut self, query: Query) -> ContractResult<SessionTicket> {
        query.validate()?;
        let query = Arc::new(query);
        self.token += 1;
        self.phase = AnalysisPhase::Loading;
        self.query = Some(query.clone());
        Ok(SessionTicket {
            token: self.token,
            query,
        })
    }

    pub fn resolve(&mut self, token: u64, result: ContractResult<BotanicalRecord>) -> Resolution {
        if token != self.token || self.phase != AnalysisPhase::Loading {
            return Resolution::Stale;
        }
        self.phase = match result {
            Ok(record) => AnalysisPhase::Success(Arc::new(record)),
            Err(_) => {
                let modality = self
                    .query
                    .as_deref()
                    .map(Query::modality)
                    .unwrap_or(QueryModality::TextSearch);
                AnalysisPhase::Error(user_facing_failure(modality).to_string())
            }
        };
        Resolution::Applied
    }

    pub fn reset(&mut self) -> bool {
        if self.phase == AnalysisPhase::Idle {
            return false;
        }
        self.token += 1;
        self.phase = AnalysisPhase::Idle;
        self.query = None;
        true
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn phase(&self) -> &AnalysisPhase {
        &self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, AnalysisPhase::Loading | AnalysisPhase::Success(_))
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            token: self.token,
            phase: self.phase.clone(),
            query: self.query.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use spesflore_contracts::errors::{
        ContractError, ContractErrorKind, PHOTO_UPLOAD_FAILED_MESSAGE,
        TEXT_SEARCH_FAILED_MESSAGE,
    };

    use super::*;

    fn record(common_name: &str) -> BotanicalRecord {
        let text = crate::client::testing::record_json(common_name);
        match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(err) => panic!("fixture record failed to parse: {err}"),
        }
    }

    #[test]
    fn begin_moves_to_loading_and_records_query() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let ticket = session.begin(Query::text("Rose"))?;
        assert_eq!(ticket.token, 1);
        assert_eq!(session.phase(), &AnalysisPhase::Loading);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.modality(), Some(QueryModality::TextSearch));
        assert_eq!(
            snapshot.query.as_deref().and_then(Query::display_text),
            Some("Rose")
        );
        assert!(session.is_active());
        Ok(())
    }

    #[test]
    fn invalid_query_leaves_session_untouched() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let ticket = session.begin(Query::text("Rose"))?;
        session.resolve(ticket.token, Ok(record("Rose")));

        let err = session.begin(Query::text("   ")).err();
        assert_eq!(
            err.map(|err| err.kind()),
            Some(ContractErrorKind::ValidationError)
        );
        assert_eq!(session.token(), 1);
        assert_eq!(session.phase().as_str(), "success");
        Ok(())
    }

    #[test]
    fn latest_submission_wins_when_results_arrive_out_of_order() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let rose = session.begin(Query::text("Rose"))?;
        let cactus = session.begin(Query::text("Cactus"))?;

        assert_eq!(
            session.resolve(cactus.token, Ok(record("Cactus"))),
            Resolution::Applied
        );
        assert_eq!(
            session.resolve(rose.token, Ok(record("Rose"))),
            Resolution::Stale
        );
        assert_eq!(
            session.phase().record().map(|record| record.common_name.as_str()),
            Some("Cactus")
        );
        Ok(())
    }

    #[test]
    fn earlier_result_arriving_first_is_discarded() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let rose = session.begin(Query::text("Rose"))?;
        let cactus = session.begin(Query::text("Cactus"))?;

        assert_eq!(
            session.resolve(rose.token, Ok(record("Rose"))),
            Resolution::Stale
        );
        assert_eq!(session.phase(), &AnalysisPhase::Loading);
        assert_eq!(
            session.snapshot().query.as_deref().and_then(Query::display_text),
            Some("Cactus")
        );

        assert_eq!(
            session.resolve(cactus.token, Ok(record("Cactus"))),
            Resolution::Applied
        );
        assert_eq!(
            session.phase().record().map(|record| record.common_name.as_str()),
            Some("Cactus")
        );
        Ok(())
    }

    #[test]
    fn failures_map_to_modality_message() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let ticket = session.begin(Query::text("Rose"))?;
        session.resolve(ticket.token, Err(ContractError::backend("503")));
        assert_eq!(
            session.phase(),
            &AnalysisPhase::Error(TEXT_SEARCH_FAILED_MESSAGE.to_string())
        );

        let ticket = session.begin(Query::image(vec![1, 2, 3], "image/png"))?;
        session.resolve(ticket.token, Err(ContractError::malformed("{}")));
        assert_eq!(
            session.phase(),
            &AnalysisPhase::Error(PHOTO_UPLOAD_FAILED_MESSAGE.to_string())
        );
        assert!(!session.is_active());
        Ok(())
    }

    #[test]
    fn reset_invalidates_in_flight_result() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let ticket = session.begin(Query::text("Rose"))?;
        assert!(session.reset());
        assert_eq!(
            session.resolve(ticket.token, Ok(record("Rose"))),
            Resolution::Stale
        );
        assert_eq!(session.phase(), &AnalysisPhase::Idle);
        assert!(session.snapshot().query.is_none());
        Ok(())
    }

    #[test]
    fn reset_from_error_and_idle() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        assert!(!session.reset());
        assert_eq!(session.token(), 0);

        let ticket = session.begin(Query::text("Rose"))?;
        session.resolve(ticket.token, Err(ContractError::empty_response("")));
        assert!(session.reset());
        assert_eq!(session.phase(), &AnalysisPhase::Idle);
        assert!(session.snapshot().query.is_none());
        Ok(())
    }

    #[test]
    fn second_resolution_for_same_token_is_stale() -> anyhow::Result<()> {
        let mut session = AnalysisSession::new();
        let ticket = session.begin(Query::text("Rose"))?;
        assert_eq!(
            session.resolve(ticket.token, Ok(record("Rose"))),
            Resolution::Applied
        );
        assert_eq!(
            session.resolve(ticket.token, Err(ContractError::backend("late"))),
            Resolution::Stale
        );
        assert!(session.phase().record().is_some());
        Ok(())
    }
}
