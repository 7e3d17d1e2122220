use std::env;
use std::time::Duration;

/// Which identity provider backs the auth context.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityBackend {
    Supabase,
    Local,
}

/// Which transport the mail dispatcher relays through.
#[derive(Debug, Clone, PartialEq)]
pub enum MailTransportKind {
    Smtp,
    Brevo,
    Relay,
    Log,
}

/// Polling cadence and ceilings for audit jobs.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub max_elapsed: Duration,
    pub max_transport_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 120,
            max_elapsed: Duration::from_secs(30 * 60),
            max_transport_failures: 3,
        }
    }
}

/// Mail dispatcher settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransportKind,
    pub from_name: String,
    pub from_address: Option<String>,
    pub brevo_api_key: Option<String>,
    pub brevo_api_url: String,
    pub relay_url: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub dedup_window: Duration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub audit_api_url: String,
    pub http_timeout: Duration,
    pub supabase_url: String,
    pub supabase_key: String,
    pub storage_bucket: String,
    pub identity_backend: IdentityBackend,
    pub jwt_secret: String,
    pub jwt_access_token_expiry_secs: i64,
    /// Where completion notifications are posted; normally this server's own
    /// `/api/send-audit-email` endpoint.
    pub notify_url: String,
    pub mail: MailConfig,
    pub poll: PollConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        let port: u16 = parse_or("BACKEND_PORT", 3000);

        let identity_backend = match env::var("IDENTITY_PROVIDER")
            .unwrap_or_else(|_| "supabase".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => IdentityBackend::Local,
            _ => IdentityBackend::Supabase,
        };

        let transport = match env::var("MAIL_TRANSPORT")
            .unwrap_or_else(|_| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "smtp" => MailTransportKind::Smtp,
            "brevo" => MailTransportKind::Brevo,
            "relay" => MailTransportKind::Relay,
            _ => MailTransportKind::Log,
        };

        let defaults = PollConfig::default();

        Ok(Self {
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            audit_api_url: trim_base(&env::var("AUDIT_API_URL")?),
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 30)),
            supabase_url: trim_base(
                &env::var("SUPABASE_URL").unwrap_or_else(|_| "http://localhost:54321".to_string()),
            ),
            supabase_key: env::var("SUPABASE_KEY").unwrap_or_default(),
            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "audit-reports".to_string()),
            identity_backend,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            jwt_access_token_expiry_secs: parse_or("JWT_ACCESS_TOKEN_EXPIRY_SECS", 3600),
            notify_url: env::var("NOTIFY_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{port}/api/send-audit-email")),
            mail: MailConfig {
                transport,
                from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Audit Wolf".to_string()),
                from_address: env::var("EMAIL_FROM").ok().filter(|v| !v.is_empty()),
                brevo_api_key: env::var("BREVO_API_KEY").ok().filter(|v| !v.is_empty()),
                brevo_api_url: env::var("BREVO_API_URL")
                    .unwrap_or_else(|_| "https://api.brevo.com/v3/smtp/email".to_string()),
                relay_url: env::var("MAIL_RELAY_URL").ok().filter(|v| !v.is_empty()),
                smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                smtp_port: parse_or("SMTP_PORT", 587),
                smtp_username: env::var("EMAIL_USER").ok().filter(|v| !v.is_empty()),
                smtp_password: env::var("EMAIL_PASSWORD").ok().filter(|v| !v.is_empty()),
                dedup_window: Duration::from_secs(parse_or("MAIL_DEDUP_WINDOW_SECS", 600)),
            },
            poll: PollConfig {
                initial_interval: Duration::from_secs(parse_or(
                    "POLL_INTERVAL_SECS",
                    defaults.initial_interval.as_secs(),
                )),
                max_interval: Duration::from_secs(parse_or(
                    "POLL_MAX_INTERVAL_SECS",
                    defaults.max_interval.as_secs(),
                )),
                multiplier: parse_or("POLL_BACKOFF_MULTIPLIER", defaults.multiplier),
                max_attempts: parse_or("POLL_MAX_ATTEMPTS", defaults.max_attempts),
                max_elapsed: Duration::from_secs(parse_or(
                    "POLL_MAX_ELAPSED_SECS",
                    defaults.max_elapsed.as_secs(),
                )),
                max_transport_failures: parse_or(
                    "POLL_MAX_TRANSPORT_FAILURES",
                    defaults.max_transport_failures,
                ),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_defaults_match_five_second_cadence() {
        let poll = PollConfig::default();
        assert_eq!(poll.initial_interval, Duration::from_secs(5));
        assert!(poll.max_attempts > 0);
        assert!(poll.max_interval >= poll.initial_interval);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(trim_base("https://api.example.com/"), "https://api.example.com");
        assert_eq!(trim_base("https://api.example.com"), "https://api.example.com");
    }
}
