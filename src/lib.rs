pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::{AppConfig, IdentityBackend};
use errors::AppError;
use services::audit_client::AuditClient;
use services::auth::{IdentityProvider, LocalIdentityProvider, SupabaseAuth};
use services::dashboard::AuditStore;
use services::mail::{self as mail_service, Mailer};
use services::notify::HttpNotifier;
use services::report::StorageLocation;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub audits: AuditClient,
    pub store: AuditStore,
    pub mailer: Arc<Mailer>,
}

impl AppState {
    /// Wire services from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {e}")))?;

        let identity: Arc<dyn IdentityProvider> = match config.identity_backend {
            IdentityBackend::Supabase => Arc::new(SupabaseAuth::new(
                http.clone(),
                &config.supabase_url,
                &config.supabase_key,
            )),
            IdentityBackend::Local => Arc::new(LocalIdentityProvider::new(
                &config.jwt_secret,
                config.jwt_access_token_expiry_secs,
            )?),
        };

        let storage = StorageLocation {
            base_url: config.supabase_url.clone(),
            bucket: config.storage_bucket.clone(),
        };

        let audits = AuditClient::new(http.clone(), &config.audit_api_url, storage.clone())
            .with_notifier(Arc::new(HttpNotifier::new(http.clone(), &config.notify_url)));

        let store = AuditStore::new(
            http.clone(),
            &config.supabase_url,
            &config.supabase_key,
            storage,
        );

        let transport = mail_service::transport_from_config(http, &config.mail);
        let mailer = Arc::new(Mailer::new(
            transport,
            &config.mail.from_name,
            config.mail.dedup_window,
        ));

        Ok(Self {
            config,
            identity,
            audits,
            store,
            mailer,
        })
    }
}
