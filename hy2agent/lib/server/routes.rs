use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::{handlers, middleware::access_gate, AgentState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the API router with every route behind the access gate.
pub fn create_router(state: AgentState) -> Router {
    let system = Router::new()
        .route("/memory", get(handlers::system_memory))
        .route("/disk", get(handlers::system_disk))
        .route("/network", get(handlers::system_network))
        .route("/info", get(handlers::system_info));

    let hysteria = Router::new()
        .route("/status", get(handlers::hysteria_status))
        .route(
            "/config",
            get(handlers::get_config).put(handlers::update_config),
        )
        .route("/config/backups", get(handlers::list_backups))
        .route("/config/restore", post(handlers::restore_config))
        .route("/logs", get(handlers::logs))
        .route("/install", post(handlers::install))
        .route("/uninstall", post(handlers::uninstall))
        .route("/update", post(handlers::upgrade))
        .route("/start", post(handlers::start))
        .route("/stop", post(handlers::stop))
        .route("/restart", post(handlers::restart))
        .route("/health", get(handlers::health))
        .route("/versions", get(handlers::versions))
        .route("/versions/install", post(handlers::install_version));

    let policy = Router::new()
        .route(
            "/whitelist",
            get(handlers::get_whitelist).put(handlers::update_whitelist),
        )
        .route(
            "/blacklist",
            get(handlers::get_blacklist).put(handlers::update_blacklist),
        )
        .route(
            "/domains",
            get(handlers::get_domains).put(handlers::update_domains),
        );

    Router::new()
        .route("/api/v1/status", get(handlers::system_status))
        .nest("/api/v1/system", system)
        .nest("/api/v1/hysteria", hysteria)
        .nest("/api/v1/config", policy)
        .layer(middleware::from_fn_with_state(state.clone(), access_gate))
        .with_state(state)
}
