pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod service;

use std::sync::Arc;

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use sqlx::{postgres::Postgres, Pool};

use crate::{
    config::Config,
    db::Store,
    errors::AppError,
    service::{gateway::PaymentGateway, mail::Dispatcher},
};

pub type PGPool = Pool<Postgres>;

/// Everything a request handler needs, shared across workers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mail: Dispatcher,
    pub config: Arc<Config>,
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("invalid request body: {}", err)).into()
}

fn query_error(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(format!("invalid query string: {}", err)).into()
}

fn path_error(_err: actix_web::error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::not_found("resource").into()
}

/// Mounts every route under `/api`. The auth middleware is wrapped around
/// the app by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(
            web::scope("/api")
                .configure(handlers::auth::init_routes)
                .configure(handlers::abstracts::init_routes)
                .configure(handlers::payment::init_routes)
                .configure(handlers::admin::init_routes)
                .configure(handlers::user::init_routes)
                .configure(handlers::review::init_routes)
                .configure(handlers::contact::init_routes),
        );
}
