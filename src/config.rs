use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    /// Issuer URL of the external identity provider. JWKS are fetched from
    /// `{issuer}/.well-known/jwks.json`.
    pub identity_issuer: String,
    /// Base URL of the provider's management API, used to backfill profile
    /// data when a token carries none.
    pub identity_api_url: String,
    /// Secret key for the management API. Empty disables the backfill.
    pub identity_secret_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            identity_issuer: env::var("IDENTITY_ISSUER").expect("IDENTITY_ISSUER must be set"),
            identity_api_url: env::var("IDENTITY_API_URL")
                .unwrap_or_else(|_| "https://api.clerk.com/v1".into()),
            identity_secret_key: env::var("IDENTITY_SECRET_KEY").unwrap_or_else(|_| String::new()),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn jwks_url(&self) -> String {
        format!(
            "{}/.well-known/jwks.json",
            self.identity_issuer.trim_end_matches('/')
        )
    }
}
