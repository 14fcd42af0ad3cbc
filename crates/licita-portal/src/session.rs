//! Contract for the authenticated portal session.
//!
//! The session is owned by the orchestrator for a whole run and must be
//! released with [`PortalSession::close`] on every exit path. Anything that
//! renders pages or calls authenticated endpoints borrows it as
//! `&dyn PortalSession`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use licita_core::{Credentials, Markup};

use crate::error::{AuthError, PageError};

/// Raw response from an authenticated HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Load `url` and return its content after the settle wait.
    async fn render(&self, url: &str) -> Result<Markup, PageError>;

    /// Activate the link `href` found on `page` and return the resulting page.
    async fn click(&self, page: &Markup, href: &str) -> Result<Markup, PageError>;

    /// Cookie-bearing GET against a data endpoint.
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpReply, PageError>;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(&self);
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn PortalSession>, AuthError>;
}

/// Run a page operation under a hard deadline.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, PageError>
where
    F: Future<Output = Result<T, PageError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PageError::Timeout(limit)),
    }
}
