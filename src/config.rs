use dotenvy::dotenv;
use std::env;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Allowed CORS origin; `*` when unset (development default).
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Config> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(5000);

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL is required".into()))?;

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET is required".into()))?;
        if jwt_secret.trim().is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".into()));
        }

        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty());

        Ok(Config {
            port,
            database_url,
            jwt_secret,
            cors_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_a_config_error() {
        let prev_db = env::var("DATABASE_URL").ok();
        let prev_secret = env::var("JWT_SECRET").ok();
        env::remove_var("DATABASE_URL");
        env::set_var("JWT_SECRET", "test-secret");

        let result = Config::from_env();
        assert!(matches!(result, Err(AppError::Config(_))));

        if let Some(v) = prev_db {
            env::set_var("DATABASE_URL", v);
        }
        match prev_secret {
            Some(v) => env::set_var("JWT_SECRET", v),
            None => env::remove_var("JWT_SECRET"),
        }
    }
}
