//! Products API
//!
//! HTTP catalog endpoints behind JWT authentication, plus the inventory workers consuming
//! the order streams. Both share one [`CatalogService`](domain_products::CatalogService).

pub mod api;
pub mod config;
pub mod openapi;
pub mod state;
pub mod worker;

use axum::Router;
use axum_helpers::{JwtAuth, RequiredRole, create_router};
use domain_products::{CatalogService, ProductCache, ProductRepository};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// The full HTTP surface minus health endpoints: documented API routes under `/api`
/// wrapped in the shared middleware stack.
pub fn build_api<R, C>(
    catalog: Arc<CatalogService<R, C>>,
    auth: JwtAuth,
    role: RequiredRole,
    request_timeout: Duration,
) -> io::Result<Router>
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    create_router::<openapi::ApiDoc>(api::routes(catalog, auth, role), request_timeout)
}
