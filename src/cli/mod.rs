//! Subcommand handlers of the `turnover` binary.

mod handlers;
mod io;
mod print;

use std::sync::Arc;

use turnover::app::{App, AppError};
use turnover::config::Command;
use turnover::resources::{ResourceFetch, ResourceQuery};
use turnover::session::{Session, SessionManager};

use handlers::{auth, graveyard, profile, recommendations, rotation, shoes};

pub async fn dispatch(app: &App, command: Command) -> Result<(), AppError> {
    let session = app.session();
    match command {
        Command::Auth(args) => auth::handle(session, args.command).await,
        Command::Rotation(args) => rotation::handle(session, args.command).await,
        Command::Graveyard(args) => graveyard::handle(session, args.command).await,
        Command::Shoes(args) => shoes::handle(session, args.command).await,
        Command::Recommendations(args) => recommendations::handle(session, args.command).await,
        Command::Profile(args) => profile::handle(session, args.command).await,
    }
}

/// Restore persisted credentials and insist on a signed-in user.
pub(crate) async fn require_session(session: &SessionManager) -> Result<Session, AppError> {
    let restored = session.restore().await?;
    if !restored.is_authenticated {
        return Err(AppError::NotAuthenticated);
    }
    Ok(restored)
}

/// Load one resource through its cached query and surface fetch errors.
pub(crate) async fn load<F: ResourceFetch>(
    session: &Arc<SessionManager>,
    fetch: F,
) -> Result<(ResourceQuery<F>, F::Output), AppError> {
    let mut query = ResourceQuery::new(Arc::clone(session), fetch);
    query.mount();
    let state = query.settle().await;
    if let Some(message) = state.error {
        return Err(AppError::Request(message));
    }
    Ok((query, state.data))
}
