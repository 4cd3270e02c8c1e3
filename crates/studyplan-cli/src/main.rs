mod config;
mod plan_cmds;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use studyplan_core::repository::PgPlanRepository;
use studyplan_db::config::DbConfig;
use studyplan_db::pool;

use config::StudyplanConfig;

#[derive(Parser)]
#[command(name = "studyplan", about = "Exam-prep study plan generator")]
struct Cli {
    /// Database URL (overrides STUDYPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a studyplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Serve the study-plan HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Study plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate a plan and make it the user's active plan
    Generate {
        /// User the plan belongs to
        #[arg(long)]
        user: Uuid,
        /// Target exam (e.g. WAEC, JAMB)
        #[arg(long)]
        exam: String,
        /// Study hours per day
        #[arg(long)]
        hours: f64,
        /// Study days per week (1-7)
        #[arg(long)]
        days: i64,
        /// Subject to study; repeat or comma-separate for several
        #[arg(long = "subject", required = true, value_delimiter = ',')]
        subjects: Vec<String>,
        /// Weak area to prioritize; repeat or comma-separate for several
        #[arg(long, value_delimiter = ',')]
        weak: Vec<String>,
        /// Topic to rotate through for a subject, as SUBJECT=TOPIC; repeat
        /// for several (e.g. --topic Physics=Optics --topic Physics=Waves)
        #[arg(long = "topic", value_parser = plan_cmds::parse_topic)]
        topics: Vec<(String, String)>,
        /// Exam date, YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = plan_cmds::parse_exam_date)]
        exam_date: Option<DateTime<Utc>>,
        /// Print the plan without saving it
        #[arg(long)]
        dry_run: bool,
    },
    /// Show one plan with its sessions
    Show {
        /// Plan ID
        plan_id: Uuid,
        /// Owner of the plan
        #[arg(long)]
        user: Uuid,
    },
    /// List all plans of a user, newest first
    List {
        #[arg(long)]
        user: Uuid,
    },
    /// Show the user's active plan
    Active {
        #[arg(long)]
        user: Uuid,
    },
    /// Mark a plan inactive (completed or cancelled)
    Deactivate {
        /// Plan ID
        plan_id: Uuid,
        /// Owner of the plan
        #[arg(long)]
        user: Uuid,
    },
}

/// Execute the `studyplan init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        planner: Default::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  planner = boost {}, sessions {}-{} min",
        cfg.planner.weak_area_boost,
        cfg.planner.min_session_minutes,
        cfg.planner.max_session_minutes
    );
    println!();
    println!("Next: run `studyplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `studyplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = StudyplanConfig::resolve(cli_db_url)?;

    println!("Initializing studyplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("studyplan db-init complete.");
    Ok(())
}

/// Execute the `studyplan serve` command.
async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = StudyplanConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let state = serve_cmd::AppState {
        repo: Arc::new(PgPlanRepository::new(db_pool.clone())),
        planner: resolved.planner,
    };
    let result = serve_cmd::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::Plan { command } => {
            let resolved = StudyplanConfig::resolve(cli.database_url.as_deref())?;
            plan_cmds::run_plan_command(command, &resolved).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_accepts_repeated_and_comma_separated_subjects() {
        let cli = Cli::try_parse_from([
            "studyplan",
            "plan",
            "generate",
            "--user",
            "550e8400-e29b-41d4-a716-446655440000",
            "--exam",
            "WAEC",
            "--hours",
            "2.5",
            "--days",
            "5",
            "--subject",
            "Mathematics,Physics",
            "--subject",
            "Chemistry",
            "--weak",
            "Physics",
            "--topic",
            "Physics=Optics",
            "--topic",
            "Physics=Waves",
            "--exam-date",
            "2026-11-20",
        ])
        .unwrap();

        let Commands::Plan {
            command:
                PlanCommands::Generate {
                    subjects,
                    weak,
                    topics,
                    hours,
                    exam_date,
                    dry_run,
                    ..
                },
        } = cli.command
        else {
            panic!("expected plan generate");
        };
        assert_eq!(subjects, ["Mathematics", "Physics", "Chemistry"]);
        assert_eq!(weak, ["Physics"]);
        assert_eq!(
            topics,
            [
                ("Physics".to_string(), "Optics".to_string()),
                ("Physics".to_string(), "Waves".to_string()),
            ]
        );
        assert_eq!(hours, 2.5);
        assert!(exam_date.is_some());
        assert!(!dry_run);
    }

    #[test]
    fn generate_requires_a_subject() {
        let result = Cli::try_parse_from([
            "studyplan", "plan", "generate", "--user", "550e8400-e29b-41d4-a716-446655440000",
            "--exam", "WAEC", "--hours", "2", "--days", "5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn generate_rejects_topic_without_subject() {
        let result = Cli::try_parse_from([
            "studyplan", "plan", "generate", "--user", "550e8400-e29b-41d4-a716-446655440000",
            "--exam", "WAEC", "--hours", "2", "--days", "5", "--subject", "Physics",
            "--topic", "Optics",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn plan_commands_reject_invalid_user_id() {
        let result = Cli::try_parse_from(["studyplan", "plan", "list", "--user", "bob"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_database_url_flag() {
        let cli = Cli::try_parse_from([
            "studyplan",
            "db-init",
            "--database-url",
            "postgresql://cli:5432/clidb",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("postgresql://cli:5432/clidb"));
        assert!(matches!(cli.command, Commands::DbInit));
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["studyplan", "serve"]).unwrap();
        let Commands::Serve { bind, port } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(bind, "127.0.0.1");
        assert_eq!(port, 3000);
    }
}
