use super::jwt::{JwtAuth, JwtClaims};
use crate::errors::AppError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Extract JWT from Authorization header or cookie
fn extract_token_from_request(headers: &HeaderMap) -> Option<String> {
    // Try Authorization header first: "Bearer <token>"
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").map(|s| s.trim().to_string()))
        .or_else(|| {
            // Fallback to cookie: "access_token=<token>"
            headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|cookies| {
                    cookies.split(';').find_map(|cookie| {
                        cookie
                            .trim()
                            .split_once('=')
                            .filter(|(name, _)| *name == "access_token")
                            .map(|(_, value)| value.to_string())
                    })
                })
        })
        .filter(|token| !token.is_empty())
}

/// JWT authentication middleware
///
/// Validates JWT tokens from the Authorization header or the `access_token` cookie and
/// inserts [`JwtClaims`] into request extensions on success. Missing or invalid tokens
/// are rejected with 401.
pub async fn jwt_auth_middleware(
    State(auth): State<JwtAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = extract_token_from_request(request.headers()) else {
        tracing::debug!("No JWT found in Authorization header or cookie");
        return Err(AppError::Unauthorized("No token provided".to_string()));
    };

    let claims = auth.verify_token(&token).map_err(|e| {
        tracing::debug!("JWT verification failed: {}", e);
        AppError::Unauthorized("Invalid token".to_string())
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Role a route group demands; state for [`require_role`].
#[derive(Clone, Debug)]
pub struct RequiredRole(Arc<str>);

impl RequiredRole {
    pub fn new(role: impl AsRef<str>) -> Self {
        Self(Arc::from(role.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Role guard; must run after [`jwt_auth_middleware`].
///
/// 401 when no claims were attached, 403 when the claims lack the role.
pub async fn require_role(
    State(required): State<RequiredRole>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(claims) = request.extensions().get::<JwtClaims>() else {
        return Err(AppError::Unauthorized("Authentication required".to_string()));
    };

    if !claims.has_role(required.as_str()) {
        tracing::info!(
            sub = %claims.sub,
            required_role = required.as_str(),
            "Access denied: missing role"
        );
        return Err(AppError::Forbidden(format!(
            "Role '{}' required",
            required.as_str()
        )));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtConfig;
    use axum::{
        Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::{get, post},
    };
    use tower::ServiceExt;

    fn auth() -> JwtAuth {
        JwtAuth::new(&JwtConfig::new("this-is-a-valid-secret-with-32-chars!"))
    }

    fn app(auth: JwtAuth) -> Router {
        let guarded = Router::new()
            .route("/write", post(|| async { "written" }))
            .route_layer(from_fn_with_state(RequiredRole::new("Director"), require_role));

        Router::new()
            .route("/read", get(|| async { "read" }))
            .merge(guarded)
            .layer(from_fn_with_state(auth, jwt_auth_middleware))
    }

    fn token(auth: &JwtAuth, roles: &[&str]) -> String {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        auth.create_token("user-1", "u@example.com", "User", &roles, 300)
            .unwrap()
    }

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        headers.insert(header::COOKIE, "access_token=def".parse().unwrap());
        assert_eq!(extract_token_from_request(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; access_token=def".parse().unwrap());
        assert_eq!(extract_token_from_request(&headers).as_deref(), Some("def"));
    }

    #[test]
    fn test_extract_token_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(extract_token_from_request(&headers).is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let response = app(auth())
            .oneshot(HttpRequest::get("/read").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_any_authenticated_user_can_read() {
        let auth = auth();
        let request = HttpRequest::get("/read")
            .header("authorization", format!("Bearer {}", token(&auth, &[])))
            .body(Body::empty())
            .unwrap();

        let response = app(auth).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_write_without_role_is_403() {
        let auth = auth();
        let request = HttpRequest::post("/write")
            .header("authorization", format!("Bearer {}", token(&auth, &["Clerk"])))
            .body(Body::empty())
            .unwrap();

        let response = app(auth).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_write_with_role_passes() {
        let auth = auth();
        let request = HttpRequest::post("/write")
            .header("authorization", format!("Bearer {}", token(&auth, &["Director"])))
            .body(Body::empty())
            .unwrap();

        let response = app(auth).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_role_guard_without_auth_layer_is_401() {
        let app = Router::new()
            .route("/write", post(|| async { "written" }))
            .route_layer(from_fn_with_state(RequiredRole::new("Director"), require_role));

        let response = app
            .oneshot(HttpRequest::post("/write").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
