use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use cadence_backend::config::Config;
use cadence_backend::error::AppError;
use cadence_backend::middleware::auth;
use cadence_backend::state::AppState;
use cadence_backend::websocket::ConnectionDirectory;
use cadence_backend::{db, logging, migrations, routes};

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Config::from_env()?;
    auth::initialize(&config.jwt_secret);

    let pool = db::init_pool(&config.database_url).await?;
    migrations::run_all(&pool).await?;

    let state = AppState {
        db: pool,
        directory: ConnectionDirectory::new(),
        config: Arc::new(config.clone()),
    };

    let bind_addr = ("0.0.0.0", config.port);
    tracing::info!(port = config.port, "starting server");

    HttpServer::new(move || {
        let cors = match &state.config.cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            None => Cors::permissive(),
        };

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(bind_addr)
    .map_err(|e| AppError::StartServer(e.to_string()))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(e.to_string()))
}
