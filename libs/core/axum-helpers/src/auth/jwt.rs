use super::config::JwtConfig;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Roles nested the way Keycloak issues them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // Subject (user ID)
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,
    pub exp: i64, // Expiration time
    #[serde(default)]
    pub iat: i64, // Issued at
}

impl JwtClaims {
    /// True when `role` appears in `roles` or `realm_access.roles`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
            || self
                .realm_access
                .as_ref()
                .is_some_and(|realm| realm.roles.iter().any(|r| r == role))
    }
}

#[derive(Serialize)]
struct IssuedClaims<'a> {
    #[serde(flatten)]
    claims: &'a JwtClaims,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a str>,
}

/// Stateless HS256 JWT verification.
#[derive(Clone)]
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtAuth {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        tracing::info!(
            issuer = config.issuer.as_deref().unwrap_or("-"),
            audience = config.audience.as_deref().unwrap_or("-"),
            "JWT auth initialized"
        );

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    /// Issue a token carrying `roles`, valid for `ttl_seconds`.
    pub fn create_token(
        &self,
        user_id: &str,
        email: &str,
        name: &str,
        roles: &[String],
        ttl_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            roles: roles.to_vec(),
            realm_access: None,
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
            iat: now.timestamp(),
        };

        self.encode_claims(&claims)
    }

    /// Sign arbitrary claims, stamping the configured issuer and audience.
    pub fn encode_claims(&self, claims: &JwtClaims) -> Result<String, jsonwebtoken::errors::Error> {
        let issued = IssuedClaims {
            claims,
            iss: self.issuer.as_deref(),
            aud: self.audience.as_deref(),
        };

        encode(&Header::new(Algorithm::HS256), &issued, &self.encoding_key)
    }

    /// Verify JWT token signature and expiry, and decode claims
    pub fn verify_token(&self, token: &str) -> Result<JwtClaims, jsonwebtoken::errors::Error> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "this-is-a-valid-secret-with-32-chars!";

    fn auth() -> JwtAuth {
        JwtAuth::new(&JwtConfig::new(SECRET))
    }

    #[test]
    fn test_token_round_trip() {
        let auth = auth();
        let token = auth
            .create_token("user-1", "a@example.com", "Ada", &["Director".to_string()], 60)
            .unwrap();

        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.has_role("Director"));
        assert!(!claims.has_role("Clerk"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = auth();
        let token = auth.create_token("user-1", "", "", &[], -3600).unwrap();
        assert!(auth.verify_token(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = JwtAuth::new(&JwtConfig::new("another-secret-that-is-32-chars-long!!"));
        let token = other.create_token("user-1", "", "", &[], 60).unwrap();
        assert!(auth().verify_token(&token).is_err());
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let issuer_a = JwtAuth::new(&JwtConfig::new(SECRET).with_issuer("https://a.example.com"));
        let issuer_b = JwtAuth::new(&JwtConfig::new(SECRET).with_issuer("https://b.example.com"));

        let token = issuer_a.create_token("user-1", "", "", &[], 60).unwrap();
        assert!(issuer_a.verify_token(&token).is_ok());
        assert!(issuer_b.verify_token(&token).is_err());
    }

    #[test]
    fn test_audience_checked_when_configured() {
        let with_aud = JwtAuth::new(&JwtConfig::new(SECRET).with_audience("catalog"));
        let token = auth().create_token("user-1", "", "", &[], 60).unwrap();
        assert!(with_aud.verify_token(&token).is_err());

        let token = with_aud.create_token("user-1", "", "", &[], 60).unwrap();
        assert!(with_aud.verify_token(&token).is_ok());
    }

    #[test]
    fn test_realm_access_roles_count() {
        let auth = auth();
        let claims = JwtClaims {
            sub: "kc-user".to_string(),
            email: String::new(),
            name: String::new(),
            roles: vec![],
            realm_access: Some(RealmAccess {
                roles: vec!["Director".to_string()],
            }),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
        };

        let token = auth.encode_claims(&claims).unwrap();
        assert!(auth.verify_token(&token).unwrap().has_role("Director"));
    }
}
