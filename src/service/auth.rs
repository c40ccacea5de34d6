use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    HttpMessage, HttpRequest,
};
use chrono::Utc;
use futures_util::future::LocalBoxFuture;
use log::{debug, warn};
use uuid::Uuid;

use crate::{db::Store, errors::AppError, models::Role};

pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller, resolved once per request by [`AuthMiddleware`].
#[derive(Debug, Clone)]
pub struct UserAuthData {
    pub user_id: i64,
    pub fullname: String,
    pub email: String,
    pub role: Role,
    pub session_id: Uuid,
}

impl UserAuthData {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("admin access required"))
        }
    }
}

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthFailure {
    Invalid,
    Expired,
}

pub fn current_user(req: &HttpRequest) -> Result<UserAuthData, AppError> {
    let extensions = req.extensions();
    if let Some(user_auth_data) = extensions.get::<UserAuthData>() {
        return Ok(user_auth_data.clone());
    }
    match extensions.get::<AuthFailure>() {
        Some(AuthFailure::Expired) => Err(AppError::TokenExpirationError),
        Some(AuthFailure::Invalid) => Err(AppError::DecodeError),
        None => Err(AppError::AuthError),
    }
}

pub fn optional_user(req: &HttpRequest) -> Option<UserAuthData> {
    req.extensions().get::<UserAuthData>().cloned()
}

pub fn require_admin(req: &HttpRequest) -> Result<UserAuthData, AppError> {
    let user_auth_data = current_user(req)?;
    user_auth_data.require_admin()?;
    Ok(user_auth_data)
}

/// Resolves the bearer token or session cookie into a [`UserAuthData`].
///
/// Requests without credentials pass through untouched; handlers that need
/// a caller reject them. A bad or expired token is remembered so the
/// handler can say which.
pub struct AuthMiddleware {
    pub store: Arc<dyn Store>,
    pub secret: String,
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            store: self.store.clone(),
            secret: self.secret.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    store: Arc<dyn Store>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let store = self.store.clone();
        let secret = self.secret.clone();

        Box::pin(async move {
            if let Some(token) = jwt::parse_request(&req) {
                match resolve(&token, &secret, store.as_ref()).await {
                    Ok(user_auth_data) => {
                        req.extensions_mut().insert(user_auth_data);
                    }
                    Err(AppError::TokenExpirationError) => {
                        req.extensions_mut().insert(AuthFailure::Expired);
                    }
                    Err(AppError::DecodeError) | Err(AppError::AuthError) => {
                        req.extensions_mut().insert(AuthFailure::Invalid);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            service.call(req).await
        })
    }
}

async fn resolve(token: &str, secret: &str, store: &dyn Store) -> Result<UserAuthData, AppError> {
    let claims = jwt::decode_session(token, secret)?;
    let now = Utc::now();
    let session = store
        .session_by_id(claims.sid)
        .await?
        .ok_or(AppError::TokenExpirationError)?;
    if session.user_id != claims.sub {
        return Err(AppError::DecodeError);
    }
    if session.expires_at <= now {
        debug!("session {} expired at {}", session.id, session.expires_at);
        return Err(AppError::TokenExpirationError);
    }
    let user = store.user_by_id(session.user_id).await?.ok_or(AppError::AuthError)?;
    if let Err(err) = store.touch_user(user.id, now).await {
        warn!("could not update last_seen for user {}: {}", user.id, err);
    }
    Ok(UserAuthData {
        user_id: user.id,
        fullname: user.fullname,
        email: user.email,
        role: user.role,
        session_id: session.id,
    })
}

pub mod jwt {
    use actix_web::dev::ServiceRequest;
    use chrono::{DateTime, Utc};
    use jsonwebtoken::{
        decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
    };
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use crate::{errors::AppError, models::Role};

    use super::SESSION_COOKIE;

    pub const PASSWORD_RESET: &str = "password_reset";

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionClaims {
        pub sub: i64,
        pub sid: Uuid,
        pub role: Role,
        pub iat: i64,
        pub exp: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ResetClaims {
        pub sub: i64,
        pub email: String,
        #[serde(rename = "type")]
        pub kind: String,
        pub jti: Uuid,
        pub iat: i64,
        pub exp: i64,
    }

    fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, AppError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|err| {
            log::error!("failed to sign token: {}", err);
            AppError::InternalError
        })
    }

    fn verify<T: for<'de> Deserialize<'de>>(token: &str, secret: &str) -> Result<T, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpirationError,
                _ => AppError::DecodeError,
            })
    }

    pub fn create_session_token(
        user_id: i64,
        session_id: Uuid,
        role: Role,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        secret: &str,
    ) -> Result<String, AppError> {
        let claims = SessionClaims {
            sub: user_id,
            sid: session_id,
            role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        sign(&claims, secret)
    }

    pub fn decode_session(token: &str, secret: &str) -> Result<SessionClaims, AppError> {
        verify(token, secret)
    }

    pub fn create_reset_token(
        user_id: i64,
        email: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        secret: &str,
    ) -> Result<String, AppError> {
        let claims = ResetClaims {
            sub: user_id,
            email: email.to_string(),
            kind: PASSWORD_RESET.to_string(),
            jti: Uuid::new_v4(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        sign(&claims, secret)
    }

    pub fn decode_reset(token: &str, secret: &str) -> Result<ResetClaims, AppError> {
        let claims: ResetClaims = verify(token, secret)?;
        if claims.kind != PASSWORD_RESET {
            return Err(AppError::DecodeError);
        }
        Ok(claims)
    }

    /// Bearer header first, then the session cookie.
    pub fn parse_request(req: &ServiceRequest) -> Option<String> {
        if let Some(auth_header) = req.headers().get("Authorization") {
            if let Ok(auth_value) = auth_header.to_str() {
                if let Some(token) = auth_value.strip_prefix("Bearer ") {
                    let token = token.trim();
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

}
