use std::env;
use std::fs;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use turnover::app::AppError;
use turnover::config::PasswordArgs;

pub const PASSWORD_ENV: &str = "TURNOVER_PASSWORD";

/// Password from `--password-file` (first line, trailing newline dropped)
/// or from `TURNOVER_PASSWORD`.
pub fn read_password(args: &PasswordArgs) -> Result<String, AppError> {
    let password = match args.password_file.as_ref() {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| AppError::Io {
                path: path.clone(),
                source,
            })?;
            raw.lines().next().unwrap_or_default().to_string()
        }
        None => env::var(PASSWORD_ENV).unwrap_or_default(),
    };

    if password.is_empty() {
        return Err(AppError::validation(format!(
            "password required: pass --password-file or set {PASSWORD_ENV}"
        )));
    }
    Ok(password)
}

pub fn parse_time_opt(value: Option<String>) -> Result<Option<OffsetDateTime>, AppError> {
    value
        .map(|raw| {
            OffsetDateTime::parse(&raw, &Rfc3339)
                .map_err(|err| AppError::validation(format!("invalid date `{raw}`: {err}")))
        })
        .transpose()
}
