use crate::{
    handlers::{images, memes, users},
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

fn meme_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(memes::list_memes).post(memes::create_meme))
        .route("/trending", get(memes::trending))
        .route("/trending/weekly", get(memes::trending_weekly))
        .route("/highlights", get(memes::highlights))
        .route("/meme-of-the-day", get(memes::meme_of_the_day))
        .route("/weekly-champion", get(memes::weekly_champion))
        .route("/user/{user_id}", get(memes::user_memes))
        .route("/user/{user_id}/top", get(memes::user_top_memes))
        .route(
            "/{id}",
            get(memes::get_meme).put(memes::update_meme).delete(memes::delete_meme),
        )
        .route("/{id}/render", get(images::render_meme))
        .route("/{id}/vote", post(memes::vote))
        .route("/{id}/comments", post(memes::add_comment))
        .route("/{id}/comments/{comment_id}", axum::routing::delete(memes::delete_comment))
        .route("/{id}/report", post(memes::report))
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/me", get(users::get_profile))
        .route(
            "/profile",
            get(users::get_profile).put(users::update_profile).delete(users::delete_account),
        )
        .route("/change-password", axum::routing::put(users::change_password))
        .route("/{user_id}/stats", get(users::user_stats))
        .route("/{user_id}/memes", get(memes::user_memes))
}

fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(users::auth_register))
        .route("/login", post(users::auth_login))
        .route("/me", get(users::get_profile))
}

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .nest("/memes", meme_routes())
        .nest("/users", user_routes())
        .nest("/auth", auth_routes())
        .route("/images/{key}", get(images::get_image))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
