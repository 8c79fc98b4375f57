pub mod models {
    pub mod meteo;
}

pub mod config;
pub mod db {
    pub mod models;
}
pub mod provider;
pub mod ratelimit;
pub mod schema;
pub mod store;
pub mod services {
    pub mod ingest;
    pub mod scheduler;
    pub mod summarize;
}

use crate::config::Config;
use crate::provider::OpenMeteoClient;
use crate::ratelimit::FixedWindowLimiter;
use crate::services::ingest::IngestionEngine;
use crate::services::scheduler::Scheduler;
use crate::services::summarize::SummarizationEngine;
use crate::store::PgStore;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (provider={}, scheduler_enabled={}, ingest_interval={}s, resync_interval={}s, on_demand_quota={}/{}s)",
        cfg.provider_base_url,
        cfg.scheduler_enabled,
        cfg.ingest_interval.as_secs(),
        cfg.registry_resync_interval.as_secs(),
        cfg.on_demand_quota,
        cfg.on_demand_window.as_secs()
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;
    let mut store = PgStore::new(conn);

    // 4) Init provider client
    let client = OpenMeteoClient::new(cfg.provider_base_url.clone(), cfg.provider_timeout);

    // 5) Assemble engines and scheduler
    let limiter = FixedWindowLimiter::new(cfg.on_demand_quota, cfg.on_demand_window);
    let ingestion = IngestionEngine::new(client, limiter);
    let summarization = SummarizationEngine::new();
    let mut scheduler = Scheduler::new(
        ingestion,
        summarization,
        cfg.ingest_interval,
        cfg.registry_resync_interval,
    );

    // 6) Recurring loop (steady tick cadence)
    if cfg.scheduler_enabled {
        scheduler.run_loop(&mut store, cfg.scheduler_tick)?;
    } else {
        info!("Scheduler loop disabled via SCHEDULER_ENABLED=false");
    }

    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        Ok(Some(LoadedEnvFile { path, explicit: true }))
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            load_env_file(&default_path)?;
            Ok(Some(LoadedEnvFile {
                path: default_path,
                explicit: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        match parse_env_assignment(&line) {
            Ok(Some((key, value))) => {
                // Preserve any value that was already supplied via the process environment.
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                return Err(format!("{}:{}: {}", path.display(), index + 1, e));
            }
        }
    }

    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let without_export = trimmed
        .strip_prefix("export ")
        .map(|s| s.trim_start())
        .unwrap_or(trimmed);

    let mut parts = without_export.splitn(2, '=');
    let key = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| "missing environment variable name".to_string())?;
    let value_part = parts.next().ok_or_else(|| "missing '=' in assignment".to_string())?;

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let value = parse_env_value(value_part);
    Ok(Some((key.to_string(), value)))
}

fn parse_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(stripped) = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
    {
        stripped.to_string()
    } else {
        trimmed.splitn(2, '#').next().unwrap_or_default().trim_end().to_string()
    }
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "meteo-timescale {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
