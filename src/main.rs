use std::{sync::Arc, time::Duration};

use abstract_portal::{
    config::Config,
    configure, db,
    service::{
        self,
        auth::AuthMiddleware,
        gateway::gateway_from_config,
        log::{init_logger, LoggerMiddleware},
        mail::{mailer_from_config, spawn_worker, Dispatcher},
    },
    AppState,
};
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use tokio_util::sync::CancellationToken;

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{context}: {err}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    init_logger();

    let config = Arc::new(Config::from_env().map_err(|e| startup_error("invalid configuration", e))?);
    config.log_summary();

    let store = db::connect(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| startup_error("failed to open the database", e))?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        service::user::ensure_admin(store.as_ref(), email, password)
            .await
            .map_err(|e| startup_error("failed to create the admin account", e))?;
    }

    let gateway = gateway_from_config(&config).map_err(|e| startup_error("payment gateway", e))?;
    let mailer = mailer_from_config(&config).map_err(|e| startup_error("mail transport", e))?;

    let shutdown = CancellationToken::new();
    let (mail, mail_rx) = Dispatcher::channel();
    let mail_worker = spawn_worker(mailer, mail_rx, shutdown.clone());

    let purge_store = store.clone();
    let purge_shutdown = shutdown.clone();
    let purge_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = purge_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = service::user::purge_reset_tokens(purge_store.as_ref()).await {
                        error!("reset token purge failed: {}", err);
                    }
                }
            }
        }
    });

    let state = web::Data::new(AppState {
        store: store.clone(),
        gateway,
        mail,
        config: config.clone(),
    });

    let (host, port) = config.bind_addr();
    info!("listening on {}:{}", host, port);
    let secret = config.jwt_secret.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure)
            .wrap(AuthMiddleware {
                store: store.clone(),
                secret: secret.clone(),
            })
            .wrap(LoggerMiddleware)
    })
    .bind((host, port))?
    .run();

    let result = server.await;
    shutdown.cancel();
    let _ = mail_worker.await;
    let _ = purge_task.await;
    info!("shut down");
    result
}
