use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// Authenticated candidate, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateId(pub Uuid);

#[derive(Clone)]
pub struct JwtAuth {
    key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = ?e, "Rejected bearer token");
                Error::Unauthenticated
            })
    }
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

pub async fn require_candidate(
    State(auth): State<JwtAuth>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return Error::Unauthenticated.into_response();
    };
    let claims = match auth.verify(token) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    let Ok(candidate_id) = claims.sub.parse::<Uuid>() else {
        return Error::Unauthenticated.into_response();
    };

    req.extensions_mut().insert(CandidateId(candidate_id));
    req.extensions_mut().insert(claims);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp: usize) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
            role: Some("candidate".into()),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn valid_token_round_trips_subject() {
        let auth = JwtAuth::new("s3cret");
        let id = Uuid::new_v4();
        let claims = auth.verify(&token("s3cret", &id.to_string(), far_future())).unwrap();
        assert_eq!(claims.sub, id.to_string());
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_rejected() {
        let auth = JwtAuth::new("s3cret");
        assert!(matches!(
            auth.verify(&token("other", "x", far_future())),
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(auth.verify(&token("s3cret", "x", 1)), Err(Error::Unauthenticated)));
    }
}
