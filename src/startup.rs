use crate::{
    app_state::AppState,
    clock::SystemClock,
    configuration::{DatabaseSettings, Settings},
    request_id::RequestUuid,
    routes::{health_check, workflows},
    telemetry::request_span,
    workflow::PgWorkflowRepository,
};
use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let db_pool = get_connection_pool(&config.database);
        let app_state = AppState {
            workflows: Arc::new(PgWorkflowRepository::new(db_pool)),
            clock: Arc::new(SystemClock),
        };

        Self::build_with_state(&config, app_state).await
    }

    /// Binds the API with caller-provided collaborators.
    pub async fn build_with_state(
        config: &Settings,
        app_state: AppState,
    ) -> Result<Self, std::io::Error> {
        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address).await?;

        Ok(Self {
            listener,
            router: router(app_state),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("Listening on {}", self.local_addr());
        axum::serve(self.listener, self.router).await
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(health_check::router())
        .merge(workflows::router())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(app_state)
}

pub fn get_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}
