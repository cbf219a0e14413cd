// src/config.rs

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::{clock::SystemClock, i18n::I18nStore},
    db::{BlobStorage, LocalBlobStorage, MemoryStore, PgStore, Store},
    services::{
        auth::AuthService,
        evidence_policy::{EvidencePolicy, PolicyMode},
        notification::TracingNotifier,
        order_desk::{Collaborators, DeskSettings, OrderDesk},
        receipt_service::PdfReceiptRenderer,
    },
};

/// Configuração lida do ambiente (.env em desenvolvimento).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Sem DATABASE_URL o servidor sobe com o store em memória
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub public_base_url: String,
    pub storage_dir: PathBuf,
    pub fonts_dir: PathBuf,
    pub evidence_policy: PolicyMode,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let evidence_policy = env::var("EVIDENCE_POLICY")
            .ok()
            .map(|value| value.parse::<PolicyMode>())
            .transpose()
            .map_err(anyhow::Error::msg)?
            .unwrap_or_default();
        let db_max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(value) => value
                .trim()
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS deve ser um número inteiro")?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            jwt_secret,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            storage_dir: env::var("STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string()).into(),
            fonts_dir: env::var("FONTS_DIR").unwrap_or_else(|_| "./fonts".to_string()).into(),
            evidence_policy,
            db_max_connections,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub auth_service: AuthService,
    pub i18n_store: Arc<I18nStore>,
    pub blobs: Arc<dyn BlobStorage>,
    pub desk: OrderDesk,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db_pool = match &config.database_url {
            Some(database_url) => {
                // Conecta ao banco de dados, usando '?' para propagar erros
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                Some(pool)
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL ausente: usando armazenamento em memória");
                None
            }
        };

        let store: Arc<dyn Store> = match &db_pool {
            Some(pool) => Arc::new(PgStore::new(pool.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        // --- Monta o gráfico de dependências ---
        let blobs: Arc<dyn BlobStorage> = Arc::new(LocalBlobStorage::new(
            config.storage_dir.clone(),
            &config.public_base_url,
        ));

        let desk = OrderDesk::new(
            Collaborators {
                store,
                blobs: blobs.clone(),
                renderer: Arc::new(PdfReceiptRenderer::new(config.fonts_dir.clone())),
                notifier: Arc::new(TracingNotifier),
                clock: Arc::new(SystemClock),
            },
            DeskSettings {
                public_base_url: config.public_base_url.clone(),
                evidence_policy: EvidencePolicy::new(config.evidence_policy),
            },
        );

        Ok(Self {
            auth_service: AuthService::new(config.jwt_secret.clone()),
            i18n_store: Arc::new(I18nStore::default()),
            config: Arc::new(config),
            db_pool,
            blobs,
            desk,
        })
    }
}
