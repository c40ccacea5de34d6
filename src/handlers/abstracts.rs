use actix_web::{get, post, web, HttpRequest, HttpResponse};

use crate::{
    dto::{AbstractQuery, AbstractResponse, NewAbstractDto, UpdateAbstractDto},
    errors::AppError,
    service::{
        self,
        auth::{current_user, optional_user},
    },
    AppState,
};

#[post("/submit")]
pub async fn submit(
    req: HttpRequest,
    dto: web::Json<NewAbstractDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    let created = service::abstracts::submit(state.get_ref(), &user_auth_data, dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(AbstractResponse {
        message: "abstract submitted".to_string(),
        abstract_: created,
    }))
}

#[get("/abstracts")]
pub async fn get_all(
    req: HttpRequest,
    query: web::Query<AbstractQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let viewer = optional_user(&req);
    let list = service::abstracts::list(state.get_ref(), viewer.as_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/abstracts/search")]
pub async fn search(
    req: HttpRequest,
    query: web::Query<AbstractQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let viewer = optional_user(&req);
    let list = service::abstracts::search(state.get_ref(), viewer.as_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/abstracts/{id}")]
pub async fn get_by_id(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let viewer = optional_user(&req);
    let detail = service::abstracts::get(state.get_ref(), viewer.as_ref(), id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/resubmit/{id}")]
pub async fn resubmit(
    req: HttpRequest,
    id: web::Path<i64>,
    dto: web::Json<UpdateAbstractDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    let updated = service::abstracts::resubmit(
        state.get_ref(),
        &user_auth_data,
        id.into_inner(),
        dto.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(AbstractResponse {
        message: "abstract resubmitted".to_string(),
        abstract_: updated,
    }))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // search must be registered ahead of the {id} route
    cfg.service(submit)
        .service(search)
        .service(get_all)
        .service(get_by_id)
        .service(resubmit);
}
