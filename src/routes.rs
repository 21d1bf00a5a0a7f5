// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, comments, posts},
    state::AppState,
    utils::jwt::{auth_middleware, guest_middleware},
};

/// Assembles the main application router.
///
/// * Nests the sub-routers (auth, posts, comments).
/// * Read endpoints are public; writes sit behind `auth_middleware`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = middleware::from_fn_with_state(state.config.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route(
            "/register",
            post(auth::register).route_layer(middleware::from_fn_with_state(
                state.config.clone(),
                guest_middleware,
            )),
        )
        .route("/login", post(auth::login));

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/{slug}", get(posts::get_post))
        // Protected post routes
        .merge(
            Router::new()
                .route("/", post(posts::create_post))
                .route(
                    "/{slug}",
                    axum::routing::patch(posts::update_post).delete(posts::delete_post),
                )
                .route(
                    "/{slug}/comments-range/{date_from}/{date_to}",
                    get(posts::comments_range),
                )
                .route_layer(require_auth.clone()),
        );

    let comment_routes = Router::new()
        .route("/", get(comments::list_comments))
        .route("/{id}", get(comments::get_comment))
        // Protected comment routes
        .merge(
            Router::new()
                .route("/", post(comments::create_comment))
                .route(
                    "/{id}",
                    axum::routing::patch(comments::update_comment)
                        .delete(comments::delete_comment),
                )
                .route_layer(require_auth),
        );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
