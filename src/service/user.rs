use std::collections::HashMap;

use chrono::{Duration, Utc};
use log::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{AbstractFilter, NewResetToken, NewUser, Store, StoreError},
    dto::{
        AbstractDetail, ForgotPasswordDto, LoginResponse, LoginUserRequest, NewUserDto,
        ResetPasswordDto, UserDashboard,
    },
    errors::AppError,
    models::{Feedback, Role, Session, User},
    service::{
        auth::{jwt, UserAuthData},
        crypto, emails,
    },
    AppState,
};

pub async fn register(state: &AppState, dto: NewUserDto) -> Result<User, AppError> {
    let valid = dto.into_user()?;
    if state.store.user_by_email(&valid.email).await?.is_some() {
        return Err(AppError::conflict("email is already registered"));
    }
    let user = state
        .store
        .create_user(NewUser {
            fullname: valid.fullname,
            email: valid.email,
            country: valid.country,
            password_hash: crypto::hash_password(&valid.password),
            role: Role::Student,
            created_at: Utc::now(),
        })
        .await?;
    info!("registered user {} ({})", user.id, user.email);
    Ok(user)
}

pub async fn login(state: &AppState, dto: LoginUserRequest) -> Result<LoginResponse, AppError> {
    let email = dto.email.trim().to_lowercase();
    let user = state
        .store
        .user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    if !crypto::verify_password(&dto.password, &user.password_hash) {
        warn!("failed login for {}", email);
        return Err(AppError::InvalidCredentials);
    }

    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        created_at: now,
        expires_at: now + Duration::hours(state.config.session_ttl_hours),
    };
    state.store.create_session(session.clone()).await?;
    let token = jwt::create_session_token(
        user.id,
        session.id,
        user.role,
        now,
        session.expires_at,
        &state.config.jwt_secret,
    )?;
    if let Err(err) = state.store.touch_user(user.id, now).await {
        warn!("could not update last_seen for user {}: {}", user.id, err);
    }
    info!("user {} logged in", user.id);
    Ok(LoginResponse {
        message: "login successful".to_string(),
        token,
        expires_at: session.expires_at,
        user,
    })
}

pub async fn logout(state: &AppState, principal: &UserAuthData) -> Result<(), AppError> {
    state.store.delete_session(principal.session_id).await?;
    info!("user {} logged out", principal.user_id);
    Ok(())
}

pub async fn me(state: &AppState, principal: &UserAuthData) -> Result<User, AppError> {
    state
        .store
        .user_by_id(principal.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
}

/// Issues a reset link for a known address. Unknown addresses get the same
/// answer so the endpoint does not reveal who is registered.
pub async fn forgot_password(state: &AppState, dto: ForgotPasswordDto) -> Result<(), AppError> {
    let email = dto.email.trim().to_lowercase();
    let user = match state.store.user_by_email(&email).await? {
        Some(user) => user,
        None => {
            info!("password reset requested for unknown address");
            return Ok(());
        }
    };

    let now = Utc::now();
    let ttl = state.config.password_reset_ttl_minutes;
    let expires_at = now + Duration::minutes(ttl);
    let token = jwt::create_reset_token(user.id, &user.email, now, expires_at, &state.config.jwt_secret)?;
    state
        .store
        .create_reset_token(NewResetToken {
            user_id: user.id,
            token: token.clone(),
            expires_at,
            created_at: now,
        })
        .await?;

    let reset_url = format!("{}/reset-password?token={}", state.config.frontend_url, token);
    state
        .mail
        .dispatch(emails::password_reset(&user.email, &user.fullname, &reset_url, ttl));
    info!("password reset issued for user {}", user.id);
    Ok(())
}

pub async fn reset_password(state: &AppState, dto: ResetPasswordDto) -> Result<(), AppError> {
    let invalid = || AppError::validation("invalid or expired reset token");
    dto.validate()?;
    let claims = jwt::decode_reset(dto.token.trim(), &state.config.jwt_secret).map_err(|_| invalid())?;

    let now = Utc::now();
    let stored = state
        .store
        .reset_token_by_value(dto.token.trim())
        .await?
        .filter(|t| t.user_id == claims.sub && t.is_valid(now))
        .ok_or_else(invalid)?;

    let hash = crypto::hash_password(&dto.password);
    match state.store.consume_reset_token(stored.id, &hash, now).await {
        Ok(()) => {
            info!("password reset completed for user {}", stored.user_id);
            Ok(())
        }
        Err(StoreError::InvalidState { .. }) => Err(invalid()),
        Err(err) => Err(err.into()),
    }
}

pub async fn purge_reset_tokens(store: &dyn Store) -> Result<u64, AppError> {
    let purged = store.purge_expired_reset_tokens(Utc::now()).await?;
    if purged > 0 {
        info!("purged {} spent reset tokens", purged);
    }
    Ok(purged)
}

pub async fn dashboard(state: &AppState, principal: &UserAuthData) -> Result<UserDashboard, AppError> {
    let user = me(state, principal).await?;
    let filter = AbstractFilter {
        author_id: Some(user.id),
        limit: i64::MAX,
        ..Default::default()
    };
    let abstracts = state.store.list_abstracts(&filter).await?;
    let ids: Vec<i64> = abstracts.iter().map(|a| a.id).collect();
    let mut feedback: HashMap<i64, Vec<Feedback>> = HashMap::new();
    for item in state.store.feedback_for(&ids).await? {
        feedback.entry(item.abstract_id).or_default().push(item);
    }
    let abstracts = abstracts
        .into_iter()
        .map(|a| AbstractDetail {
            feedback: feedback.remove(&a.id).unwrap_or_default(),
            abstract_: a,
        })
        .collect();

    let payments = state.store.payments_for_author(user.id).await?;
    let notifications = state.store.notifications_for(user.id).await?;
    let unread_notifications = notifications.iter().filter(|n| !n.is_read).count();
    Ok(UserDashboard {
        user,
        abstracts,
        payments,
        notifications,
        unread_notifications,
    })
}

pub async fn mark_notification_read(
    state: &AppState,
    principal: &UserAuthData,
    notification_id: i64,
) -> Result<(), AppError> {
    if state
        .store
        .mark_notification_read(principal.user_id, notification_id)
        .await?
    {
        Ok(())
    } else {
        Err(AppError::not_found("notification"))
    }
}

/// Makes sure the configured admin account exists and carries the admin role.
pub async fn ensure_admin(store: &dyn Store, email: &str, password: &str) -> Result<(), AppError> {
    let valid = NewUserDto {
        fullname: "Administrator".to_string(),
        email: email.trim().to_string(),
        country: "-".to_string(),
        password: password.to_string(),
        confirm_password: None,
    }
    .into_user()?;
    if let Some(existing) = store.user_by_email(&valid.email).await? {
        if existing.role != Role::Admin {
            warn!("{} exists but is not an admin; leaving it untouched", valid.email);
        }
        return Ok(());
    }
    let admin = store
        .create_user(NewUser {
            fullname: valid.fullname,
            email: valid.email,
            country: valid.country,
            password_hash: crypto::hash_password(&valid.password),
            role: Role::Admin,
            created_at: Utc::now(),
        })
        .await?;
    info!("created admin account {}", admin.email);
    Ok(())
}
