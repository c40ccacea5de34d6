use actix_web::{get, post, web, HttpRequest, HttpResponse};
use log::warn;

use crate::{
    dto::{CallbackQuery, ConfirmPaymentDto, InitiatePaymentDto},
    errors::AppError,
    service::{
        self,
        auth::{current_user, optional_user},
    },
    AppState,
};

#[post("/payments/initiate")]
pub async fn initiate(
    req: HttpRequest,
    dto: web::Json<InitiatePaymentDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    let response = service::payment::initiate(state.get_ref(), &user_auth_data, dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(response))
}

/// Settles a payment on the caller's word; nothing is checked with the
/// gateway. Deployments should send PayChangu to `/payments/callback`, which
/// verifies the transaction before settling.
#[post("/payments/confirm")]
pub async fn confirm(
    req: HttpRequest,
    dto: web::Json<ConfirmPaymentDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let dto = dto.into_inner();
    let caller = match optional_user(&req) {
        Some(user) => format!("user {}", user.user_id),
        None => "anonymous caller".to_string(),
    };
    warn!(
        "unverified payment confirmation (payment_id {:?}, tx_ref {:?}) from {} at {}",
        dto.payment_id,
        dto.tx_ref,
        caller,
        req.connection_info().realip_remote_addr().unwrap_or("unknown address")
    );
    let response = service::payment::confirm(state.get_ref(), dto).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/payments/callback")]
pub async fn callback(
    query: web::Query<CallbackQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let response = service::payment::callback(state.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(initiate).service(confirm).service(callback);
}
