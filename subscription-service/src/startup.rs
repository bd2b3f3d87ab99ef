//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::SubscriptionConfig;
use crate::handlers;
use crate::services::{
    EmailProvider, HtmlInvoiceRenderer, InvoiceNotifier, LifecycleEngine, MockEmailProvider,
    MongoSubscriptionStore, PlanCatalog, RazorpayClient, SignatureVerifier, SmtpEmailProvider,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
}

impl AppState {
    pub fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/payments/config", get(handlers::payments::payment_config))
        .route("/payments/plans", get(handlers::payments::list_plans))
        .route("/payments/order", post(handlers::payments::create_order))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/payments/webhook", post(handlers::payments::webhook))
        .route(
            "/payments/subscription",
            get(handlers::subscription::get_subscription),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect the store, wire the engine and bind the listener. Port 0
    /// binds a random port.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.mongodb.uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::from(e)
            })?;
        client_options.app_name = Some("subscription-service".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(&config.mongodb.database);

        let store = MongoSubscriptionStore::new(client, &db);
        store.init_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            AppError::DatabaseError(e)
        })?;

        let gateway = RazorpayClient::new(config.razorpay.clone());
        if gateway.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured, paid orders will fail");
        }

        let email_provider: Arc<dyn EmailProvider> = if config.smtp.enabled {
            match SmtpEmailProvider::new(config.smtp.clone()) {
                Ok(provider) => {
                    tracing::info!("SMTP email provider initialized");
                    Arc::new(provider)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP provider: {}. Using mock.", e);
                    Arc::new(MockEmailProvider::new())
                }
            }
        } else {
            tracing::info!("SMTP provider disabled, using mock email provider");
            Arc::new(MockEmailProvider::new())
        };

        let notifier = Arc::new(InvoiceNotifier::new(
            email_provider,
            Arc::new(HtmlInvoiceRenderer),
            Some(config.smtp.from_name.clone()),
        ));

        let engine = LifecycleEngine::new(
            Arc::new(PlanCatalog::standard()),
            SignatureVerifier::new(
                config.razorpay.key_secret.clone(),
                config.razorpay.webhook_secret.clone(),
            ),
            gateway,
            Arc::new(store),
            notifier,
            config.billing.currency.clone(),
            config.billing.brand.clone(),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Subscription service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state: AppState::new(engine),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM, then wait for pending activation notices.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let engine = self.state.engine.clone();
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Draining pending notifications");
        engine.drain_notifications().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
