//! # runa_api
//!
//! HTTP API library for Runa.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use runa_core::auth::AuthResult;
use runa_core::auth::jwt::SigningKey;
use runa_core::auth::password::Hasher;
use runa_core::auth::tokens::TokenService;
use runa_core::cache::Cache;
use runa_core::ratelimit::RateLimitManager;
use runa_core::store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{apitoken, auth, pages, sessions, users, version};
use crate::middleware::rate_limit::RouteLimit;

/// Global per-client budget on every `/api` route.
const GLOBAL_LIMIT: RouteLimit = RouteLimit::new("global", Duration::from_millis(500), 50);
/// Registration budget per client.
const USERS_CREATE_LIMIT: RouteLimit = RouteLimit::new("users_create", Duration::from_secs(15), 1);
/// Page creation budget per client.
const PAGES_CREATE_LIMIT: RouteLimit = RouteLimit::new("pages_create", Duration::from_secs(5), 5);

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<Cache>,
    pub tokens: Arc<TokenService>,
    pub limiter: Arc<RateLimitManager>,
    pub hasher: Hasher,
    pub config: ApiConfig,
}

impl AppState {
    /// Wire services around `store`. The signing key comes from
    /// `config.jwt_secret` or is generated.
    pub fn new(store: Arc<dyn Store>, config: ApiConfig) -> AuthResult<Self> {
        Ok(Self::with_hasher(store, config, Hasher::new()?))
    }

    pub fn with_hasher(store: Arc<dyn Store>, config: ApiConfig, hasher: Hasher) -> Self {
        let cache = Arc::new(Cache::new(
            Arc::clone(&store),
            config.cache_ttl,
            config.access_lifetime,
        ));
        let key = SigningKey::from_config(config.jwt_secret.as_deref());
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            key,
            config.lifetimes(),
        ));
        Self {
            store,
            cache,
            tokens,
            limiter: Arc::new(RateLimitManager::new()),
            hasher,
            config,
        }
    }

    /// Drop expired cache entries and idle rate-limit buckets. Returns how
    /// many of each were removed.
    pub fn housekeep(&self) -> (usize, usize) {
        (self.cache.purge_expired(), self.limiter.purge_idle())
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_API_VERSION, get(version::version_handler))
        .route(routes::POST_API_LOGIN, post(auth::login_handler))
        .route(routes::POST_API_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_API_ACCESSTOKEN, post(auth::access_token_handler))
        .route(
            routes::POST_API_USERS,
            post(auth::register_handler).layer(axum::middleware::from_fn_with_state(
                (state.clone(), USERS_CREATE_LIMIT),
                middleware::rate_limit::limit_route,
            )),
        )
        .route(
            routes::GET_API_USERS_USERNAME,
            get(users::check_username_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(
            routes::API_USERS_ME,
            get(users::get_me_handler)
                .post(users::update_me_handler)
                .delete(users::delete_me_handler),
        )
        .route(
            routes::POST_API_USERS_ME_PAGEORDER,
            post(users::page_order_handler),
        )
        .route(routes::GET_API_SESSIONS, get(sessions::list_sessions_handler))
        .route(
            routes::DELETE_API_SESSIONS_ID,
            delete(sessions::delete_session_handler),
        )
        .route(
            routes::API_APITOKEN,
            get(apitoken::get_api_token_handler)
                .post(apitoken::post_api_token_handler)
                .delete(apitoken::delete_api_token_handler),
        )
        .route(
            routes::POST_API_PAGES,
            post(pages::create_page_handler).layer(axum::middleware::from_fn_with_state(
                (state.clone(), PAGES_CREATE_LIMIT),
                middleware::rate_limit::limit_route,
            )),
        )
        .route(
            routes::API_PAGES_ID,
            get(pages::get_page_handler)
                .post(pages::edit_page_handler)
                .delete(pages::delete_page_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            (state.clone(), GLOBAL_LIMIT),
            middleware::rate_limit::limit_route,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::pretty::pretty_json,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use runa_core::models::User;
    use runa_core::store::MemoryStore;

    use super::*;

    #[test]
    fn housekeeping_drops_expired_entries_and_idle_buckets() {
        let config = ApiConfig {
            cache_ttl: Duration::ZERO,
            ..ApiConfig::default()
        };
        let state = AppState::with_hasher(
            Arc::new(MemoryStore::new()),
            config,
            Hasher::with_params(1024, 1, 1).unwrap(),
        );
        let user = User::new("hank", "h".into());
        state.cache.set_user_by_id(user.uid, Some(user));
        drop(state.limiter.get_limiter("idle", Duration::from_millis(1), 1));
        let held = state.limiter.get_limiter("held", Duration::from_millis(1), 1);

        assert_eq!(state.housekeep(), (1, 1));
        assert_eq!(state.limiter.len(), 1);
        drop(held);
    }
}
