use crate::{
    db::{DashboardStats, ReviewEntry},
    errors::AppError,
    service::auth::UserAuthData,
    AppState,
};

pub async fn dashboard(state: &AppState, principal: &UserAuthData) -> Result<DashboardStats, AppError> {
    principal.require_admin()?;
    Ok(state.store.dashboard_stats().await?)
}

pub async fn reviews(state: &AppState, principal: &UserAuthData) -> Result<Vec<ReviewEntry>, AppError> {
    principal.require_admin()?;
    Ok(state.store.list_reviews().await?)
}
