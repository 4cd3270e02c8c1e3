//! Shared PostgreSQL for studyplan integration tests.
//!
//! One server per test binary; every test gets its own database in it.
//!
//! - **`STUDYPLAN_TEST_PG_URL`** set: use that server directly (CI service
//!   container, local install). The URL points at the server root.
//! - Otherwise start `postgres:18` through testcontainers.
//!
//! When the container cannot start, tests fail. Setting
//! **`STUDYPLAN_SKIP_PG_TESTS=1`** turns that into a skip: [`create_test_db`]
//! returns `None` and the calling test returns early.

pub mod checks;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use studyplan_db::config::DbConfig;
use studyplan_db::pool;

struct SharedPg {
    base_url: String,
    /// Keeps the container alive. `None` for an external server.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<Option<SharedPg>> = OnceCell::const_new();

/// Env var that lets PostgreSQL tests skip instead of fail.
pub const SKIP_ENV: &str = "STUDYPLAN_SKIP_PG_TESTS";

/// Whether `value` (the content of [`SKIP_ENV`]) asks for a skip.
fn skip_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Skip (return `None`) when opted in, otherwise fail the test.
fn unavailable(skip: bool, reason: String) -> Option<SharedPg> {
    if skip {
        eprintln!("skipping PostgreSQL tests ({SKIP_ENV} set): {reason}");
        return None;
    }
    panic!(
        "PostgreSQL unavailable: {reason}\n\
         set STUDYPLAN_TEST_PG_URL, start Docker, or set {SKIP_ENV}=1 to skip"
    );
}

async fn init_shared_pg() -> Option<SharedPg> {
    if let Ok(url) = std::env::var("STUDYPLAN_TEST_PG_URL") {
        return Some(SharedPg {
            base_url: url.trim_end_matches('/').to_string(),
            _container: None,
        });
    }

    let skip = skip_requested(std::env::var(SKIP_ENV).ok().as_deref());
    if skip {
        return unavailable(skip, "no STUDYPLAN_TEST_PG_URL".to_string());
    }

    let container = match Postgres::default().with_tag("18").start().await {
        Ok(c) => c,
        Err(e) => return unavailable(skip, format!("failed to start container: {e}")),
    };
    let host = match container.get_host().await {
        Ok(h) => h,
        Err(e) => return unavailable(skip, format!("failed to get host: {e}")),
    };
    let port = match container.get_host_port_ipv4(5432).await {
        Ok(p) => p,
        Err(e) => return unavailable(skip, format!("failed to get mapped port: {e}")),
    };

    Some(SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    })
}

/// Server root URL of the shared PostgreSQL, if one is reachable.
pub async fn pg_url() -> Option<&'static str> {
    SHARED_PG
        .get_or_init(init_shared_pg)
        .await
        .as_ref()
        .map(|pg| pg.base_url.as_str())
}

async fn maintenance_pool(base_url: &str) -> PgPool {
    let maint_url = format!("{base_url}/postgres");
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a migrated temporary database.
///
/// Returns `(pool, db_name)`, or `None` when PostgreSQL tests are skipped
/// through [`SKIP_ENV`]. Panics when PostgreSQL is unavailable otherwise.
/// Pass `db_name` to [`drop_test_db`] when done.
pub async fn create_test_db() -> Option<(PgPool, String)> {
    let Some(base_url) = pg_url().await else {
        return None;
    };

    let db_name = format!("studyplan_test_{}", Uuid::new_v4().simple());
    let maint_pool = maintenance_pool(base_url).await;
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let config = DbConfig::new(format!("{base_url}/{db_name}"))
        .with_max_connections(8)
        .with_acquire_timeout(Duration::from_secs(30));
    let temp_pool = pool::create_pool(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e:#}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    Some((temp_pool, db_name))
}

/// Drop a temporary database, terminating leftover connections first.
pub async fn drop_test_db(db_name: &str) {
    let Some(base_url) = pg_url().await else {
        return;
    };
    let maint_pool = maintenance_pool(base_url).await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}
