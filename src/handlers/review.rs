use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::{
    dto::NewReviewDto,
    errors::AppError,
    service::{self, auth::optional_user},
    AppState,
};

#[post("/reviews")]
pub async fn create(
    req: HttpRequest,
    dto: web::Json<NewReviewDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reviewer = optional_user(&req);
    let review = service::review::create(state.get_ref(), reviewer.as_ref(), dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "thank you for your review",
        "review": review,
    })))
}

#[get("/reviews")]
pub async fn get_all(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let list = service::review::list(state.get_ref()).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/reviews/stats")]
pub async fn stats(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let stats = service::review::stats(state.get_ref()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create).service(stats).service(get_all);
}
