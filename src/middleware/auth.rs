use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use chrono::{Duration, Utc};
use futures::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::AppError;

const TOKEN_EXPIRY_HOURS: i64 = 24;

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

static JWT_KEYS: OnceCell<(EncodingKey, DecodingKey)> = OnceCell::new();

/// Install the shared HS256 secret. Must run during startup before any
/// token operation; later calls are no-ops.
pub fn initialize(secret: &str) {
    let _ = JWT_KEYS.set((
        EncodingKey::from_secret(secret.as_bytes()),
        DecodingKey::from_secret(secret.as_bytes()),
    ));
}

fn keys() -> Result<&'static (EncodingKey, DecodingKey), AppError> {
    JWT_KEYS
        .get()
        .ok_or_else(|| AppError::Config("JWT secret not initialized".into()))
}

pub fn issue_token(user_id: Uuid) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_EXPIRY_HOURS)).timestamp(),
    };
    encode(&Header::default(), &claims, &keys()?.0).map_err(|_| AppError::Internal)
}

/// Validate a bearer token and return the authenticated user id.
/// Missing, malformed and expired tokens all map to `Unauthorized`.
pub fn verify_token(token: &str) -> Result<Uuid, AppError> {
    let data = decode::<Claims>(token, &keys()?.1, &Validation::default())
        .map_err(|_| AppError::Unauthorized)?;
    Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).to_string())
}

/// Authenticated user id, inserted into request extensions by the middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

impl FromRequest for AuthedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthedUser>().copied() {
            Some(user) => ready(Ok(user)),
            None => ready(Err(AppError::Unauthorized.into())),
        }
    }
}

pub struct JwtAuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            // Read headers into owned data before touching extensions_mut:
            // both go through the same RefCell on actix-web 4.
            let token = bearer_token(req.request());

            let user_id = match token {
                Some(ref t) => match verify_token(t) {
                    Ok(id) => id,
                    Err(e) => return Err(e.into()),
                },
                None => return Err(AppError::Unauthorized.into()),
            };

            req.extensions_mut().insert(AuthedUser(user_id));
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_keys() {
        initialize("test-secret");
    }

    #[test]
    fn issued_tokens_verify_back_to_the_same_user() {
        init_test_keys();
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id).unwrap();
        assert_eq!(verify_token(&token).unwrap(), user_id);
    }

    #[test]
    fn garbage_tokens_are_unauthorized() {
        init_test_keys();
        assert!(matches!(
            verify_token("not-a-jwt"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_tokens_are_unauthorized() {
        init_test_keys();
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &keys().unwrap().0).unwrap();
        assert!(matches!(
            verify_token(&token),
            Err(AppError::Unauthorized)
        ));
    }
}
