//! Helpers shared by unit tests that touch process-wide environment.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or write environment variables.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `f` with `XDG_CONFIG_HOME` pointing at `config_home` and
/// `STUDYPLAN_DATABASE_URL` set to `db_url` (or unset), then restore both.
///
/// Callers must hold [`lock_env`].
pub fn with_config_home<T>(config_home: &Path, db_url: Option<&str>, f: impl FnOnce() -> T) -> T {
    let orig_xdg = std::env::var_os("XDG_CONFIG_HOME");
    let orig_db = std::env::var_os("STUDYPLAN_DATABASE_URL");

    unsafe { std::env::set_var("XDG_CONFIG_HOME", config_home) };
    match db_url {
        Some(url) => unsafe { std::env::set_var("STUDYPLAN_DATABASE_URL", url) },
        None => unsafe { std::env::remove_var("STUDYPLAN_DATABASE_URL") },
    }

    let result = f();

    match orig_xdg {
        Some(v) => unsafe { std::env::set_var("XDG_CONFIG_HOME", v) },
        None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
    }
    match orig_db {
        Some(v) => unsafe { std::env::set_var("STUDYPLAN_DATABASE_URL", v) },
        None => unsafe { std::env::remove_var("STUDYPLAN_DATABASE_URL") },
    }

    result
}
