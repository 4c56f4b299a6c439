//! API routes module

pub mod health;
pub mod products;

use axum::Router;
use axum_helpers::{JwtAuth, RequiredRole};
use domain_products::{CatalogService, ProductCache, ProductRepository};
use std::sync::Arc;

/// Routes nested under `/api`.
pub fn routes<R, C>(catalog: Arc<CatalogService<R, C>>, auth: JwtAuth, role: RequiredRole) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    Router::new().nest("/products", products::router(catalog, auth, role))
}
