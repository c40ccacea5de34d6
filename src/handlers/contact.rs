use actix_web::{post, web, HttpResponse};
use serde_json::json;

use crate::{dto::ContactDto, errors::AppError, service, AppState};

#[post("/contact")]
pub async fn submit(dto: web::Json<ContactDto>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let contact = service::contact::submit(state.get_ref(), dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "message received",
        "id": contact.id,
    })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(submit);
}
