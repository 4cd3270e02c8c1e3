use std::env;
use std::time::Duration;

/// Connection settings for the study-plan database.
///
/// The URL comes from `STUDYPLAN_DATABASE_URL` when set, otherwise
/// [`DbConfig::DEFAULT_URL`]. Pool sizing is fixed at construction and can be
/// overridden with the builder-style setters.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL, optionally with a `?query` suffix.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a caller waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/studyplan";
    pub const ENV_VAR: &str = "STUDYPLAN_DATABASE_URL";

    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a config from the environment, falling back to the default URL.
    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url)
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Split the URL into `(server, database, query)` parts.
    ///
    /// `postgresql://u:p@host:5432/db?sslmode=require` becomes
    /// `("postgresql://u:p@host:5432", "db", Some("sslmode=require"))`.
    fn split(&self) -> Option<(&str, &str, Option<&str>)> {
        let (base, query) = match self.database_url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (self.database_url.as_str(), None),
        };
        let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
        let slash = base[scheme_end..].rfind('/')? + scheme_end;
        Some((&base[..slash], &base[slash + 1..], query))
    }

    /// The database name component of the URL, if any.
    pub fn database_name(&self) -> Option<&str> {
        self.split()
            .map(|(_, name, _)| name)
            .filter(|name| !name.is_empty())
    }

    /// Same server and query parameters, different database.
    pub fn with_database(&self, name: &str) -> String {
        match self.split() {
            Some((server, _, Some(query))) => format!("{server}/{name}?{query}"),
            Some((server, _, None)) => format!("{server}/{name}"),
            None => format!("{}/{name}", self.database_url.trim_end_matches('/')),
        }
    }

    /// URL of the `postgres` maintenance database on the same server, used to
    /// issue `CREATE DATABASE` when the target does not exist yet.
    pub fn maintenance_url(&self) -> String {
        self.with_database("postgres")
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
