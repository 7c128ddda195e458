use crate::db::{Database, NewSuggestion, SuggestionRecord, SuggestionStatus};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("This command can only be used in a suggestion thread.")]
    NotASuggestionThread,
    #[error("This suggestion has already been {0}.")]
    AlreadyResolved(&'static str),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Which way a reaction moved a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    pub fn from_emoji(emoji: &str, upvote: &str, downvote: &str) -> Option<Self> {
        if emoji == upvote {
            Some(Vote::Up)
        } else if emoji == downvote {
            Some(Vote::Down)
        } else {
            None
        }
    }

    fn deltas(self, added: bool) -> (i64, i64) {
        let step = if added { 1 } else { -1 };
        match self {
            Vote::Up => (step, 0),
            Vote::Down => (0, step),
        }
    }
}

pub struct SuggestionService {
    db: Database,
}

impl SuggestionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, suggestion: NewSuggestion) -> anyhow::Result<i64> {
        let thread_id = suggestion.thread_id;
        let id = self
            .db
            .run_blocking(move |db| db.insert_suggestion(&suggestion))
            .await?;
        info!("Suggestion {} created with thread {}", id, thread_id);
        Ok(id)
    }

    /// Finds the pending suggestion discussed in `thread_id`.
    pub async fn pending_in_thread(
        &self,
        thread_id: u64,
    ) -> Result<SuggestionRecord, SuggestionError> {
        let suggestion = self
            .db
            .run_blocking(move |db| db.get_suggestion_by_thread(thread_id))
            .await?
            .ok_or(SuggestionError::NotASuggestionThread)?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(SuggestionError::AlreadyResolved(suggestion.status.as_str()));
        }
        Ok(suggestion)
    }

    /// Sets the final status. Fails if someone resolved it in the meantime.
    pub async fn resolve(
        &self,
        suggestion: &SuggestionRecord,
        status: SuggestionStatus,
    ) -> Result<(), SuggestionError> {
        let id = suggestion.id;
        let updated = self
            .db
            .run_blocking(move |db| db.resolve_suggestion(id, status))
            .await?;
        if !updated {
            return Err(SuggestionError::AlreadyResolved("resolved"));
        }
        info!("Suggestion {} marked {}", id, status.as_str());
        Ok(())
    }

    pub async fn record_vote(&self, message_id: u64, vote: Vote, added: bool) -> anyhow::Result<bool> {
        let (up, down) = vote.deltas(added);
        self.db
            .run_blocking(move |db| db.adjust_votes(message_id, up, down))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service_with_suggestion() -> SuggestionService {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db.insert_suggestion(&NewSuggestion {
            message_id: 10,
            thread_id: 20,
            user_id: 30,
            guild_id: 40,
            title: "Events".to_string(),
            content: "Weekly build contest".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        SuggestionService::new(db)
    }

    #[test]
    fn test_vote_from_emoji() {
        assert_eq!(Vote::from_emoji("👍", "👍", "👎"), Some(Vote::Up));
        assert_eq!(Vote::from_emoji("👎", "👍", "👎"), Some(Vote::Down));
        assert_eq!(Vote::from_emoji("🎉", "👍", "👎"), None);
        assert_eq!(Vote::Down.deltas(false), (0, -1));
    }

    #[tokio::test]
    async fn test_resolve_only_in_pending_thread() {
        let service = service_with_suggestion();

        assert!(matches!(
            service.pending_in_thread(99).await,
            Err(SuggestionError::NotASuggestionThread)
        ));

        let suggestion = service.pending_in_thread(20).await.unwrap();
        service
            .resolve(&suggestion, SuggestionStatus::Denied)
            .await
            .unwrap();

        assert!(matches!(
            service.pending_in_thread(20).await,
            Err(SuggestionError::AlreadyResolved("denied"))
        ));
        assert!(service
            .resolve(&suggestion, SuggestionStatus::Accepted)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_votes_follow_reactions() {
        let service = service_with_suggestion();
        assert!(service.record_vote(10, Vote::Up, true).await.unwrap());
        assert!(service.record_vote(10, Vote::Down, true).await.unwrap());
        assert!(service.record_vote(10, Vote::Down, false).await.unwrap());
        assert!(!service.record_vote(11, Vote::Up, true).await.unwrap());
    }
}
