use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::{
    dto::MessageResponse,
    errors::AppError,
    service::{self, auth::current_user},
    AppState,
};

#[get("/user/dashboard")]
pub async fn dashboard(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    let dashboard = service::user::dashboard(state.get_ref(), &user_auth_data).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[post("/notifications/{id}/read")]
pub async fn mark_read(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    service::user::mark_notification_read(state.get_ref(), &user_auth_data, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("notification marked as read")))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard).service(mark_read);
}
