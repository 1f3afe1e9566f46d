use std::sync::Arc;

use turnover::app::AppError;
use turnover::config::ShoesCommand;
use turnover::resources::ShoesFetch;
use turnover::session::SessionManager;
use turnover_api_types::ShoeFilters;

use crate::cli::load;
use crate::cli::print::print_json;

pub async fn handle(session: &Arc<SessionManager>, cmd: ShoesCommand) -> Result<(), AppError> {
    // The catalog is public; a stored session only adds the bearer token.
    session.restore().await?;
    match cmd {
        ShoesCommand::List {
            category,
            brand,
            search,
            page,
            page_size,
        } => {
            let filters = ShoeFilters {
                category,
                brand,
                search,
                page,
                page_size,
            };
            let (_, shoes) = load(session, ShoesFetch::new(filters)).await?;
            print_json(&shoes)
        }
        ShoesCommand::Show { shoe_id } => {
            let shoe = session.api().shoe(&shoe_id).await?;
            print_json(&shoe)
        }
    }
}
