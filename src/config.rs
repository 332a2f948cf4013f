/// Process-wide settings read once at startup and passed around explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Prefix for feed titles.
    pub site_name: Option<String>,
    /// Absolute origin used for feed and notification links, without trailing slash.
    pub base_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub admin_webhook_url: Option<String>,
    /// Usernames that always receive the admin role at login.
    pub bootstrap_admins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_name: None,
            base_url: "http://localhost:8080".into(),
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            admin_webhook_url: None,
            bootstrap_admins: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        fn non_empty(name: &str) -> Option<String> {
            std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }
        let d = Self::default();
        Self {
            site_name: non_empty("SITE_NAME"),
            base_url: non_empty("BASE_URL").map(|u| u.trim_end_matches('/').to_string()).unwrap_or(d.base_url),
            bind_addr: non_empty("BIND_ADDR").unwrap_or(d.bind_addr),
            port: non_empty("PORT").and_then(|p| p.parse().ok()).unwrap_or(d.port),
            admin_webhook_url: non_empty("ADMIN_WEBHOOK_URL"),
            bootstrap_admins: non_empty("BOOTSTRAP_ADMIN_USERNAMES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        }
    }

    pub fn with_site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn is_bootstrap_admin(&self, username: &str) -> bool {
        self.bootstrap_admins.iter().any(|u| u == username)
    }
}
