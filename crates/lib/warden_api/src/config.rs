//! API server configuration.

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// Public base URL of this authority; the `iss` of every token.
    pub issuer: String,
    /// Mark session cookies `Secure`.
    pub secure_cookies: bool,
    /// Shared secret for the `/internal` routes called by the chat bot.
    /// Unset disables them.
    pub internal_token: Option<String>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable         | Default                 |
    /// |------------------|-------------------------|
    /// | `BIND_ADDR`      | `127.0.0.1:3100`        |
    /// | `ISSUER`         | `http://localhost:3100` |
    /// | `SECURE_COOKIES` | `false`                 |
    /// | `INTERNAL_TOKEN` | unset                   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            issuer: std::env::var("ISSUER")
                .unwrap_or_else(|_| "http://localhost:3100".into())
                .trim_end_matches('/')
                .to_string(),
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            internal_token: std::env::var("INTERNAL_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        }
    }
}
