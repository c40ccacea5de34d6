use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::{
    dto::{ReviewAbstractDto, ReviewResponse},
    errors::AppError,
    service::{self, auth::require_admin},
    AppState,
};

#[post("/admin/review/{id}")]
pub async fn review(
    req: HttpRequest,
    id: web::Path<i64>,
    dto: web::Json<ReviewAbstractDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_auth_data = require_admin(&req)?;
    let applied =
        service::abstracts::review(state.get_ref(), &user_auth_data, id.into_inner(), dto.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(ReviewResponse {
        message: format!("abstract {}", applied.abstract_.status),
        abstract_: applied.abstract_,
        feedback: applied.feedback,
    }))
}

#[get("/admin")]
pub async fn dashboard(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user_auth_data = require_admin(&req)?;
    let stats = service::admin::dashboard(state.get_ref(), &user_auth_data).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/admin/reviews")]
pub async fn reviews(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user_auth_data = require_admin(&req)?;
    let reviews = service::admin::reviews(state.get_ref(), &user_auth_data).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(review).service(reviews).service(dashboard);
}
