//! Portal endpoints and per-step timeouts.

use std::time::Duration;

use licita_core::BulletinId;

/// Endpoint templates use `{id}` as the placeholder for a bulletin or record id.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Page holding the login form.
    pub login_url: String,
    /// Form field names for the account credentials.
    pub email_field: String,
    pub password_field: String,
    /// Calendar page listing published bulletins.
    pub calendar_url: String,
    /// JSON endpoint returning one bulletin's biddings.
    pub biddings_api: String,
    /// Bulletin detail page (the context holding links to each record).
    pub bulletin_detail: String,
    /// Canonical detail page of a single record.
    pub record_detail: String,
    /// Fixed page size; large enough that one request covers a bulletin.
    pub page_size: u32,
    pub navigation_timeout: Duration,
    pub click_timeout: Duration,
    pub api_timeout: Duration,
    /// Extra wait after a page loads before its content is read.
    pub settle: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        const BASE: &str = "https://consultaonline.conlicitacao.com.br/boletim_web/public";
        Self {
            login_url: "https://conlicitacao.com.br/".into(),
            email_field: "email".into(),
            password_field: "password".into(),
            calendar_url: format!("{BASE}/boletins"),
            biddings_api: format!("{BASE}/boletins/{{id}}/biddings.json"),
            bulletin_detail: format!("{BASE}/boletins/{{id}}"),
            record_detail: format!("{BASE}/biddings/{{id}}"),
            page_size: 100,
            navigation_timeout: Duration::from_secs(60),
            click_timeout: Duration::from_secs(45),
            api_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(1),
        }
    }
}

impl PortalConfig {
    /// Point every endpoint at a different base URL, keeping the path layout.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.calendar_url = format!("{base}/boletins");
        self.biddings_api = format!("{base}/boletins/{{id}}/biddings.json");
        self.bulletin_detail = format!("{base}/boletins/{{id}}");
        self.record_detail = format!("{base}/biddings/{{id}}");
        self
    }

    pub fn biddings_url(&self, bulletin: BulletinId) -> String {
        fill(&self.biddings_api, bulletin.get())
    }

    pub fn bulletin_url(&self, bulletin: BulletinId) -> String {
        fill(&self.bulletin_detail, bulletin.get())
    }

    pub fn record_url(&self, record_id: u64) -> String {
        fill(&self.record_detail, record_id)
    }
}

fn fill(template: &str, id: u64) -> String {
    template.replace("{id}", &id.to_string())
}
