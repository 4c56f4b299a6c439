//! Products API routes with the access-control chain applied

use axum::{Router, middleware::from_fn_with_state};
use axum_helpers::{JwtAuth, RequiredRole, jwt_auth_middleware, require_role};
use domain_products::{CatalogService, ProductCache, ProductRepository, handlers};
use std::sync::Arc;

/// Reads need a valid token; writes additionally need `role`.
///
/// The JWT layer wraps both groups, so it runs before the role guard.
pub fn router<R, C>(catalog: Arc<CatalogService<R, C>>, auth: JwtAuth, role: RequiredRole) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    let writes = handlers::write_routes(Arc::clone(&catalog))
        .route_layer(from_fn_with_state(role, require_role));

    handlers::read_routes(catalog)
        .merge(writes)
        .route_layer(from_fn_with_state(auth, jwt_auth_middleware))
}
