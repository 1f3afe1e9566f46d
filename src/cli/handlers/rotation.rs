use std::sync::Arc;

use serde_json::json;
use turnover::app::AppError;
use turnover::config::RotationCommand;
use turnover::resources::RotationFetch;
use turnover::session::SessionManager;
use turnover_api_types::AddToRotationRequest;

use crate::cli::io::parse_time_opt;
use crate::cli::print::print_json;
use crate::cli::{load, require_session};

pub async fn handle(session: &Arc<SessionManager>, cmd: RotationCommand) -> Result<(), AppError> {
    require_session(session).await?;
    match cmd {
        RotationCommand::List { category } => {
            let (_, rotation) = load(session, RotationFetch::new(category)).await?;
            print_json(&rotation)
        }
        RotationCommand::Add {
            shoe_id,
            start_date,
        } => {
            let request = AddToRotationRequest {
                shoe_id,
                start_date: parse_time_opt(start_date)?,
            };
            let (mut query, _) = load(session, RotationFetch::default()).await?;
            let added = query
                .add_to_rotation(&request)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&added)
        }
        RotationCommand::Remove { shoe_id } => {
            let (mut query, _) = load(session, RotationFetch::default()).await?;
            if !query.remove_from_rotation(&shoe_id).await? {
                return Err(AppError::NotAuthenticated);
            }
            print_json(&json!({ "removed": shoe_id }))
        }
    }
}
