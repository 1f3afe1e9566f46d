use serde_json::json;
use turnover::app::AppError;
use turnover::config::{AuthCommand, PasswordArgs};
use turnover::session::{SessionManager, SignUpOutcome};
use turnover_api_types::SignUpRequest;

use crate::cli::io::read_password;
use crate::cli::print::print_json;
use crate::cli::require_session;

pub async fn handle(session: &SessionManager, cmd: AuthCommand) -> Result<(), AppError> {
    match cmd {
        AuthCommand::SignIn { email, password } => sign_in(session, &email, &password).await,
        AuthCommand::SignUp {
            email,
            first_name,
            last_name,
            password,
        } => sign_up(session, email, first_name, last_name, &password).await,
        AuthCommand::SignOut => sign_out(session).await,
        AuthCommand::Whoami => whoami(session).await,
    }
}

async fn sign_in(
    session: &SessionManager,
    email: &str,
    password: &PasswordArgs,
) -> Result<(), AppError> {
    let password = read_password(password)?;
    let signed_in = session.sign_in(email, &password).await?;
    print_json(&signed_in)
}

async fn sign_up(
    session: &SessionManager,
    email: String,
    first_name: String,
    last_name: String,
    password: &PasswordArgs,
) -> Result<(), AppError> {
    let request = SignUpRequest {
        email,
        password: read_password(password)?,
        first_name,
        last_name,
    };
    match session.sign_up(&request).await? {
        SignUpOutcome::SignedIn => print_json(&session.snapshot()),
        SignUpOutcome::ConfirmationRequired { message } => print_json(&json!({
            "requires_confirmation": true,
            "message": message,
        })),
    }
}

async fn sign_out(session: &SessionManager) -> Result<(), AppError> {
    session.restore().await?;
    if let Some(notify) = session.sign_out() {
        let _ = notify.await;
    }
    print_json(&json!({ "signed_out": true }))
}

async fn whoami(session: &SessionManager) -> Result<(), AppError> {
    let current = require_session(session).await?;
    print_json(&current)
}
