//! Route table

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{
    handlers::{admin, health, messages, public},
    middleware::auth::{jwt_auth_middleware, require_admin},
    websocket::live_handler,
    AppState,
};

pub fn create_routes(state: &AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/health", get(health::handle_health))
        .route("/api/portfolio", get(public::handle_portfolio))
        .route("/api/contact", post(public::handle_contact))
        .route("/api/projects", get(public::handle_projects))
        .route("/api/track", post(public::handle_track))
        .route("/api/admin/login", post(admin::handle_login))
        .route("/api/admin/live", get(live_handler));

    // Layers run bottom-up: the token is resolved before the role check.
    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(admin::handle_dashboard))
        .route(
            "/api/admin/projects",
            get(admin::handle_list_projects).post(admin::handle_create_project),
        )
        .route(
            "/api/admin/projects/:id",
            put(admin::handle_update_project).delete(admin::handle_delete_project),
        )
        .route("/api/admin/messages", get(messages::handle_list_messages))
        .route("/api/admin/messages/stats", get(messages::handle_message_stats))
        .route("/api/admin/messages/export", get(messages::handle_export_messages))
        .route("/api/admin/messages/import", post(messages::handle_import_messages))
        .route("/api/admin/messages/read-all", post(messages::handle_mark_all_read))
        .route("/api/admin/messages/test", post(messages::handle_test_message))
        .route(
            "/api/admin/messages/:id",
            put(messages::handle_update_message).delete(messages::handle_delete_message),
        )
        .route(
            "/api/admin/settings",
            get(admin::handle_get_settings).put(admin::handle_update_settings),
        )
        .route("/api/admin/analytics", get(admin::handle_analytics))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    public_routes.merge(admin_routes)
}
