//src/main.rs

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use ordem_servico::{
    config::{AppConfig, AppState},
    docs::ApiDoc,
    handlers,
    middleware::{auth::auth_guard, tenancy::tenant_guard},
    services::evidence_service::MAX_EVIDENCE_BYTES,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    if let Some(pool) = &app_state.db_pool {
        sqlx::migrate!().run(pool).await?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    }

    // Rotas do cliente (sem login)
    let public_routes = Router::new()
        .route("/approvals/{token}", get(handlers::public::get_approval_by_token))
        .route("/approvals/{token}/decision", post(handlers::public::submit_approval_decision))
        .route("/verify/{hash}", get(handlers::public::verify_receipt));

    // Rotas da equipe: auth_guard (externo) e depois tenant_guard
    let order_routes = Router::new()
        .route("/", post(handlers::orders::create_order))
        .route("/{order_id}", get(handlers::orders::get_order))
        .route("/{order_id}/audit", get(handlers::orders::list_audit))
        .route("/{order_id}/transitions", post(handlers::orders::transition_order))
        .route("/{order_id}/items", post(handlers::orders::add_item))
        .route("/{order_id}/items/{item_id}"
               ,patch(handlers::orders::update_item)
               .delete(handlers::orders::remove_item)
        )
        .route("/{order_id}/checklist", put(handlers::orders::set_checklist))
        .route("/{order_id}/technical-notes", put(handlers::orders::set_technical_notes))
        .route("/{order_id}/approvals", post(handlers::approvals::create_approval_request))
        .route("/{order_id}/approvals/in-person", post(handlers::approvals::register_in_person_approval))
        .route("/{order_id}/approvals/in-person/rejection", post(handlers::approvals::register_in_person_rejection))
        .route("/{order_id}/approvals/physical", post(handlers::approvals::register_physical_approval))
        .route("/{order_id}/evidence", post(handlers::evidence::upload_evidence))
        .route("/{order_id}/payments"
               ,post(handlers::payments::record_payment)
               .get(handlers::payments::list_payments)
        )
        .route("/{order_id}/payments/summary", get(handlers::payments::payment_summary));

    let approval_routes = Router::new()
        .route("/{approval_id}", get(handlers::approvals::get_approval))
        .route("/{approval_id}/receipt", post(handlers::approvals::regenerate_receipt));

    let evidence_routes = Router::new()
        .route("/{evidence_id}"
               ,get(handlers::evidence::get_evidence)
               .delete(handlers::evidence::retire_evidence)
        )
        .route("/{evidence_id}/verify", get(handlers::evidence::verify_evidence));

    let settings_routes = Router::new()
        .route("/"
               ,get(handlers::settings::get_settings)
               .put(handlers::settings::update_settings)
        );

    let staff_routes = Router::new()
        .nest("/orders", order_routes)
        .nest("/approvals", approval_routes)
        .nest("/evidence", evidence_routes)
        .nest("/settings", settings_routes)
        .layer(axum_middleware::from_fn(tenant_guard))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/public", public_routes)
        .nest("/api", staff_routes)
        .route("/files/{*key}", get(handlers::public::serve_file))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Multipart de evidência com folga para os campos de texto
        .layer(DefaultBodyLimit::max(MAX_EVIDENCE_BYTES + 1024 * 1024))
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
