//! Portal login credentials, sourced from the environment or a JSON file.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials file not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("credentials file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no credentials: set {email_var}/{password_var} or pass a credentials file")]
    Missing {
        email_var: &'static str,
        password_var: &'static str,
    },
}

/// Email/password pair for the portal account.
///
/// `Debug` redacts the password so credentials can never leak into logs.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub const EMAIL_VAR: &'static str = "LICITA_EMAIL";
    pub const PASSWORD_VAR: &'static str = "LICITA_PASSWORD";

    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Load `{ "email": ..., "password": ... }` from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        if !path.exists() {
            return Err(CredentialsError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve credentials from explicit values (typically clap args backed by
    /// [`EMAIL_VAR`](Self::EMAIL_VAR)/[`PASSWORD_VAR`](Self::PASSWORD_VAR)),
    /// falling back to a credentials file.
    pub fn resolve(
        email: Option<String>,
        password: Option<String>,
        file: Option<&Path>,
    ) -> Result<Self, CredentialsError> {
        match (email, password, file) {
            (Some(email), Some(password), _) => Ok(Self::new(email, password)),
            (_, _, Some(path)) => Self::from_file(path),
            _ => Err(CredentialsError::Missing {
                email_var: Self::EMAIL_VAR,
                password_var: Self::PASSWORD_VAR,
            }),
        }
    }
}
