//! HTTP surface: store admin routes plus the cached upstream passthrough.

mod admin;
mod middleware;
mod proxy;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get},
};

use crate::cache::{CacheState, StoreAdmin, response_cache_layer};
use crate::infra::upstream::Upstream;

pub use admin::ApiEnvelope;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheState,
    pub admin: StoreAdmin,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    /// Wire the admin facade to the same adapter the cache layer uses.
    pub fn new(cache: CacheState, upstream: Arc<dyn Upstream>) -> Self {
        let admin = StoreAdmin::new(cache.store.clone());
        Self {
            cache,
            admin,
            upstream,
        }
    }
}

impl FromRef<AppState> for StoreAdmin {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Upstream> {
    fn from_ref(state: &AppState) -> Self {
        state.upstream.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    // Everything that is not an admin route goes upstream through the cache.
    let cached_routes = Router::new()
        .route("/", get(proxy::forward).post(proxy::forward))
        .route("/{*path}", get(proxy::forward).post(proxy::forward))
        .layer(from_fn_with_state(
            state.cache.clone(),
            response_cache_layer,
        ));

    let admin_routes = Router::new()
        .route("/store/info", get(admin::store_info))
        .route("/store/all-keys", get(admin::all_keys))
        .route("/store/flush-all-keys", delete(admin::flush_all_keys));

    admin_routes
        .merge(cached_routes)
        .with_state(state)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}
