use std::sync::Arc;

use turnover::app::AppError;
use turnover::config::RecommendationsCommand;
use turnover::resources::{RecommendationsFetch, SimilarShoesFetch};
use turnover::session::SessionManager;

use crate::cli::print::print_json;
use crate::cli::{load, require_session};

pub async fn handle(
    session: &Arc<SessionManager>,
    cmd: RecommendationsCommand,
) -> Result<(), AppError> {
    require_session(session).await?;
    match cmd {
        RecommendationsCommand::List { category, limit } => {
            let (_, response) = load(session, RecommendationsFetch::new(category, limit)).await?;
            print_json(&response)
        }
        RecommendationsCommand::Similar { shoe_id, limit } => {
            if shoe_id.trim().is_empty() {
                return Err(AppError::validation("shoe id must not be empty"));
            }
            let (_, similar) = load(session, SimilarShoesFetch::new(shoe_id, limit)).await?;
            print_json(&similar)
        }
    }
}
