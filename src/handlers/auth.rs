use actix_web::{
    cookie::{time::Duration, Cookie, SameSite},
    get, post, web, HttpRequest, HttpResponse,
};
use log::info;
use serde_json::json;

use crate::{
    dto::{ForgotPasswordDto, LoginUserRequest, MessageResponse, NewUserDto, ResetPasswordDto},
    errors::AppError,
    service::{
        self,
        auth::{current_user, SESSION_COOKIE},
    },
    AppState,
};

#[post("/register")]
pub async fn register(
    dto: web::Json<NewUserDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = service::user::register(state.get_ref(), dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "registration successful",
        "user": user,
    })))
}

#[post("/login")]
pub async fn login(
    dto: web::Json<LoginUserRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let response = service::user::login(state.get_ref(), dto.into_inner()).await?;
    let cookie = Cookie::build(SESSION_COOKIE, response.token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::hours(state.config.session_ttl_hours))
        .finish();
    Ok(HttpResponse::Ok().cookie(cookie).json(response))
}

#[post("/logout")]
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    service::user::logout(state.get_ref(), &user_auth_data).await?;
    let cleared = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(Duration::ZERO)
        .finish();
    Ok(HttpResponse::Ok()
        .cookie(cleared)
        .json(MessageResponse::new("logged out")))
}

#[get("/me")]
pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user_auth_data = current_user(&req)?;
    let user = service::user::me(state.get_ref(), &user_auth_data).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/forgot-password")]
pub async fn forgot_password(
    dto: web::Json<ForgotPasswordDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    service::user::forgot_password(state.get_ref(), dto.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(
        "if the address is registered, a reset link has been sent",
    )))
}

#[post("/reset-password")]
pub async fn reset_password(
    dto: web::Json<ResetPasswordDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    service::user::reset_password(state.get_ref(), dto.into_inner()).await?;
    info!("password reset accepted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("password has been reset")))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(logout)
        .service(me)
        .service(forgot_password)
        .service(reset_password);
}
