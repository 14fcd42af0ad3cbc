//! reqwest-backed portal session.
//!
//! Authentication posts the login form once; the client's cookie store then
//! carries the session for every later page and API request of the run.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use licita_core::{Credentials, Markup};
use regex::Regex;
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::config::PortalConfig;
use crate::error::{AuthError, PageError};
use crate::session::{HttpReply, PortalSession, SessionProvider, bounded};

static FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b[^>]*?\baction\s*=\s*["']([^"']*)["']"#).expect("valid form regex")
});

/// Logs in against the portal's form and hands out [`HttpSession`]s.
pub struct HttpSessionProvider {
    config: PortalConfig,
}

impl HttpSessionProvider {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<Client, AuthError> {
        Client::builder()
            .cookie_store(true)
            .timeout(self.config.navigation_timeout)
            .user_agent(concat!("licita/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::SubmitFailed(e.to_string()))
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn PortalSession>, AuthError> {
        let client = self.client()?;
        let login_url = self.config.login_url.as_str();
        let limit = self.config.navigation_timeout;

        let form = bounded(limit, fetch(&client, login_url, &[]))
            .await
            .map_err(|e| match e {
                PageError::Timeout(d) => AuthError::Timeout(d),
                other => AuthError::FormUnavailable {
                    url: login_url.into(),
                    reason: other.to_string(),
                },
            })?;

        for field in [&self.config.email_field, &self.config.password_field] {
            if !has_field(&form.body, field) {
                return Err(AuthError::FormUnavailable {
                    url: login_url.into(),
                    reason: format!("no `{field}` field on login page"),
                });
            }
        }

        let target = form_target(login_url, &form.body);
        let mut fields = hidden_inputs(&form.body);
        fields.retain(|(name, _)| {
            name != &self.config.email_field && name != &self.config.password_field
        });
        debug!(target = %target, hidden = fields.len(), "submitting login form");
        fields.push((self.config.email_field.clone(), credentials.email.clone()));
        fields.push((self.config.password_field.clone(), credentials.password.clone()));

        let submit = async {
            let response = client.post(&target).form(&fields).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(HttpReply { status, body })
        };
        let reply = tokio::time::timeout(limit, submit)
            .await
            .map_err(|_| AuthError::Timeout(limit))?
            .map_err(|e| AuthError::SubmitFailed(e.without_url().to_string()))?;

        if !login_accepted(&reply, &self.config.password_field) {
            return Err(AuthError::Rejected {
                status: reply.status,
            });
        }

        info!("portal session established");
        Ok(Box::new(HttpSession {
            client,
            settle: self.config.settle,
        }))
    }
}

/// Authenticated session sharing one cookie jar.
pub struct HttpSession {
    client: Client,
    settle: Duration,
}

#[async_trait]
impl PortalSession for HttpSession {
    async fn render(&self, url: &str) -> Result<Markup, PageError> {
        let reply = fetch(&self.client, url, &[]).await?;
        if !reply.is_success() {
            return Err(PageError::Status {
                status: reply.status,
                url: url.into(),
            });
        }
        tokio::time::sleep(self.settle).await;
        Ok(Markup::new(url, reply.body))
    }

    async fn click(&self, page: &Markup, href: &str) -> Result<Markup, PageError> {
        let target = resolve(page.url(), href)?;
        self.render(&target).await
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpReply, PageError> {
        fetch(&self.client, url, query).await
    }

    async fn close(&self) {
        debug!("portal session closed");
    }
}

async fn fetch(client: &Client, url: &str, query: &[(&str, String)]) -> Result<HttpReply, PageError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(transport)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport)?;
    Ok(HttpReply { status, body })
}

fn transport(e: reqwest::Error) -> PageError {
    PageError::Transport(e.without_url().to_string())
}

/// Resolve `href` against the URL of the page it was found on.
fn resolve(base: &str, href: &str) -> Result<String, PageError> {
    let invalid = |reason: String| PageError::InvalidUrl {
        url: href.into(),
        reason,
    };
    let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let joined = base.join(href).map_err(|e| invalid(e.to_string()))?;
    Ok(joined.into())
}

fn has_field(body: &str, name: &str) -> bool {
    let pattern = format!(r#"(?i)\bname\s*=\s*["']?{}["'\s>]"#, regex::escape(name));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(body))
}

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid input regex"));

/// `name`/`value` pairs of the hidden inputs on a page (CSRF tokens and the
/// like), in document order.
fn hidden_inputs(body: &str) -> Vec<(String, String)> {
    INPUT_TAG
        .find_iter(body)
        .map(|m| m.as_str())
        .filter(|tag| attribute(tag, "type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")))
        .filter_map(|tag| {
            let name = attribute(tag, "name")?;
            Some((name, attribute(tag, "value").unwrap_or_default()))
        })
        .collect()
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)\s{}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#,
        regex::escape(name)
    );
    let caps = Regex::new(&pattern).ok()?.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

/// A login succeeded when the portal answered 2xx and did not serve the
/// login form again.
fn login_accepted(reply: &HttpReply, password_field: &str) -> bool {
    reply.is_success() && !has_field(&reply.body, password_field)
}

/// Where the login form posts to, falling back to the login page itself.
fn form_target(login_url: &str, body: &str) -> String {
    FORM_ACTION
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|action| !action.is_empty())
        .and_then(|action| resolve(login_url, action).ok())
        .unwrap_or_else(|| login_url.to_string())
}
