//! Authentication and authorization module.
//!
//! This module provides:
//! - HS256 JWT verification (and issuing, for tooling and tests)
//! - A middleware that authenticates every request carrying a bearer token
//! - A role guard layered on top for routes that need a specific role
//!
//! # Example
//!
//! ```ignore
//! use axum_helpers::auth::{JwtAuth, JwtConfig, RequiredRole, jwt_auth_middleware, require_role};
//! use core_config::FromEnv;
//!
//! let auth = JwtAuth::new(&JwtConfig::from_env()?);
//!
//! let writes = Router::new()
//!     .route("/api/admin", post(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(RequiredRole::new("Director"), require_role));
//!
//! let app = Router::new()
//!     .merge(writes)
//!     .layer(axum::middleware::from_fn_with_state(auth, jwt_auth_middleware));
//! ```

pub mod config;
pub mod jwt;
pub mod middleware;

// Re-export commonly used types
pub use config::JwtConfig;
pub use jwt::{JwtAuth, JwtClaims, RealmAccess};
pub use middleware::{RequiredRole, jwt_auth_middleware, require_role};
