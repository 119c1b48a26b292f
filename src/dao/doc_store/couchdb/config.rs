/// Runtime configuration describing how to reach the shared CouchDB database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Database used when none is configured.
const DEFAULT_DATABASE: &str = "station_quest";

impl CouchConfig {
    /// Construct a configuration from explicit base URL and database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Build a configuration for `base_url`, defaulting the database name
    /// and picking up `COUCH_USERNAME`/`COUCH_PASSWORD` when both are set.
    pub fn resolve(base_url: impl Into<String>, database: Option<String>) -> Self {
        let database = database.unwrap_or_else(|| DEFAULT_DATABASE.into());
        let config = Self::new(base_url, database);

        match (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => config.with_credentials(username, password),
            _ => config,
        }
    }
}
