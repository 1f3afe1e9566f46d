use std::sync::Arc;

use serde_json::json;
use turnover::app::AppError;
use turnover::config::GraveyardCommand;
use turnover::resources::GraveyardFetch;
use turnover::session::SessionManager;
use turnover_api_types::{GraveyardFilters, RetireShoeRequest, RetiredShoeUpdate};

use crate::cli::print::print_json;
use crate::cli::{load, require_session};

pub async fn handle(session: &Arc<SessionManager>, cmd: GraveyardCommand) -> Result<(), AppError> {
    require_session(session).await?;
    match cmd {
        GraveyardCommand::List {
            category,
            min_rating,
            sort_by,
            sort_order,
        } => {
            let filters = GraveyardFilters {
                category,
                min_rating,
                sort_by: sort_by.map(Into::into),
                sort_order: sort_order.map(Into::into),
            };
            let (_, graveyard) = load(session, GraveyardFetch::new(filters)).await?;
            print_json(&graveyard)
        }
        GraveyardCommand::Retire {
            shoe_id,
            rating,
            review,
            miles_run,
        } => {
            let request = RetireShoeRequest {
                shoe_id,
                rating,
                review,
                miles_run,
            };
            let (mut query, _) = load(session, GraveyardFetch::default()).await?;
            let retired = query
                .retire_shoe(&request)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&retired)
        }
        GraveyardCommand::Update {
            graveyard_id,
            rating,
            review,
            miles_run,
        } => {
            let update = RetiredShoeUpdate {
                rating,
                review,
                miles_run,
            };
            if update.query_pairs().is_empty() {
                return Err(AppError::validation(
                    "nothing to update: pass --rating, --review or --miles-run",
                ));
            }
            let (mut query, _) = load(session, GraveyardFetch::default()).await?;
            let updated = query
                .update_retired_shoe(&graveyard_id, &update)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&updated)
        }
        GraveyardCommand::Delete { graveyard_id } => {
            let (mut query, _) = load(session, GraveyardFetch::default()).await?;
            if !query.delete_from_graveyard(&graveyard_id).await? {
                return Err(AppError::NotAuthenticated);
            }
            print_json(&json!({ "deleted": graveyard_id }))
        }
    }
}
