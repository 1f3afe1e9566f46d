use std::sync::Arc;

use turnover::app::AppError;
use turnover::config::ProfileCommand;
use turnover::resources::{ProfileEditor, UserStatsFetch};
use turnover::session::SessionManager;
use turnover_api_types::UserProfileUpdate;

use crate::cli::print::print_json;
use crate::cli::{load, require_session};

pub async fn handle(session: &Arc<SessionManager>, cmd: ProfileCommand) -> Result<(), AppError> {
    require_session(session).await?;
    match cmd {
        ProfileCommand::Stats => {
            let (_, stats) = load(session, UserStatsFetch::for_session(session)).await?;
            print_json(&stats)
        }
        ProfileCommand::Update {
            first_name,
            last_name,
            avg_miles_per_week,
            preferred_categories,
        } => {
            let update = UserProfileUpdate {
                first_name,
                last_name,
                avg_miles_per_week,
                preferred_categories: (!preferred_categories.is_empty())
                    .then_some(preferred_categories),
            };
            if update == UserProfileUpdate::default() {
                return Err(AppError::validation("nothing to update"));
            }
            let mut editor = ProfileEditor::new(Arc::clone(session));
            let profile = editor
                .update_profile(&update)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&profile)
        }
    }
}
