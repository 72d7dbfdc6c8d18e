use crate::{config::Config, websocket::ConnectionDirectory};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub directory: ConnectionDirectory,
    pub config: Arc<Config>,
}
