//! CLI handlers for `studyplan plan` subcommands.
//!
//! Implements:
//! - `studyplan plan generate ...`          -- generate (or preview) a plan
//! - `studyplan plan show <plan-id> --user` -- one plan with its sessions
//! - `studyplan plan list --user`           -- all plans of a user
//! - `studyplan plan active --user`         -- the user's active plan
//! - `studyplan plan deactivate <plan-id> --user`

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use studyplan_core::planner::{PlanWarning, PlannerConfig, StudyPlanRequest};
use studyplan_core::repository::{PgPlanRepository, PlanDetail, PlanRepository};
use studyplan_core::service;
use studyplan_db::models::{StudyPlan, StudySession};
use studyplan_db::pool;

use crate::PlanCommands;
use crate::config::StudyplanConfig;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
///
/// `generate --dry-run` runs without a database; everything else connects
/// first.
pub async fn run_plan_command(command: PlanCommands, config: &StudyplanConfig) -> Result<()> {
    if matches!(command, PlanCommands::Generate { dry_run: true, .. }) {
        return cmd_preview(&config.planner, &command);
    }

    let db_pool = pool::create_pool(&config.db_config).await?;
    let repo = PgPlanRepository::new(db_pool.clone());
    let result = run_with_repo(&command, &repo, &config.planner).await;
    db_pool.close().await;
    result
}

async fn run_with_repo(
    command: &PlanCommands,
    repo: &dyn PlanRepository,
    planner: &PlannerConfig,
) -> Result<()> {
    match command {
        PlanCommands::Generate { user, .. } => {
            cmd_generate(repo, planner, *user, &request_from_args(command)).await
        }
        PlanCommands::Show { plan_id, user } => cmd_show(repo, *user, *plan_id).await,
        PlanCommands::List { user } => cmd_list(repo, *user).await,
        PlanCommands::Active { user } => cmd_active(repo, *user).await,
        PlanCommands::Deactivate { plan_id, user } => cmd_deactivate(repo, *user, *plan_id).await,
    }
}

/// Accept `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_exam_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date {s:?}; expected YYYY-MM-DD or RFC 3339"))
}

/// Parse a `--topic SUBJECT=TOPIC` value.
pub fn parse_topic(s: &str) -> Result<(String, String), String> {
    let (subject, topic) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid topic {s:?}; expected SUBJECT=TOPIC"))?;
    let (subject, topic) = (subject.trim(), topic.trim());
    if subject.is_empty() || topic.is_empty() {
        return Err(format!("invalid topic {s:?}; subject and topic must be non-empty"));
    }
    Ok((subject.to_string(), topic.to_string()))
}

fn request_from_args(command: &PlanCommands) -> StudyPlanRequest {
    match command {
        PlanCommands::Generate {
            exam,
            hours,
            days,
            subjects,
            weak,
            topics,
            exam_date,
            ..
        } => {
            let mut by_subject: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (subject, topic) in topics {
                by_subject
                    .entry(subject.clone())
                    .or_default()
                    .push(topic.clone());
            }
            StudyPlanRequest {
                target_exam: exam.clone(),
                hours_per_day: *hours,
                days_per_week: *days,
                subjects: subjects.clone(),
                weak_areas: (!weak.is_empty()).then(|| weak.clone()),
                exam_date: *exam_date,
                topics: (!by_subject.is_empty()).then_some(by_subject),
            }
        }
        _ => StudyPlanRequest::default(),
    }
}

// -----------------------------------------------------------------------
// studyplan plan generate
// -----------------------------------------------------------------------

fn cmd_preview(planner: &PlannerConfig, command: &PlanCommands) -> Result<()> {
    let PlanCommands::Generate { user, .. } = command else {
        bail!("only `plan generate` supports --dry-run");
    };
    let request = request_from_args(command);
    let draft = service::preview_plan(planner, *user, &request, Utc::now())?;

    println!("Dry run: nothing was saved.");
    println!();
    println!("Plan: {}", draft.plan.plan_name);
    println!("  Weeks until exam: {}", draft.plan.weeks_until_exam);
    println!("  Weekly minutes:   {}", draft.plan.total_minutes());
    println!();
    println!("Weights:");
    for w in &draft.weights {
        let marker = if w.boosted { " (weak area)" } else { "" };
        println!("  {:<24} {:>5.1}%{marker}", w.subject, w.weight * 100.0);
    }
    println!();
    for s in &draft.plan.sessions {
        println!(
            "  Day {}  #{}  {:<24} {:>4} min{}",
            s.day_index + 1,
            s.sequence + 1,
            s.subject,
            s.duration_minutes,
            topic_suffix(s.topic.as_deref()),
        );
    }
    print!("{}", WarningsView(&draft.warnings, draft.unscheduled_minutes));
    Ok(())
}

async fn cmd_generate(
    repo: &dyn PlanRepository,
    planner: &PlannerConfig,
    user: Uuid,
    request: &StudyPlanRequest,
) -> Result<()> {
    let generated = service::generate_plan(repo, planner, user, request).await?;

    println!("Study plan generated.");
    println!();
    print!("{}", PlanDetailView(&generated.plan));
    print!(
        "{}",
        WarningsView(&generated.warnings, generated.unscheduled_minutes)
    );
    Ok(())
}

// -----------------------------------------------------------------------
// studyplan plan show / list / active / deactivate
// -----------------------------------------------------------------------

async fn cmd_show(repo: &dyn PlanRepository, user: Uuid, plan_id: Uuid) -> Result<()> {
    let Some(detail) = repo.get(user, plan_id).await? else {
        bail!("study plan {plan_id} not found for user {user}");
    };
    print!("{}", PlanDetailView(&detail));
    Ok(())
}

async fn cmd_list(repo: &dyn PlanRepository, user: Uuid) -> Result<()> {
    let plans = repo.list_for_user(user).await?;
    if plans.is_empty() {
        println!("No study plans found. Use `studyplan plan generate` to create one.");
        return Ok(());
    }
    print!("{}", PlanListView(&plans));
    Ok(())
}

async fn cmd_active(repo: &dyn PlanRepository, user: Uuid) -> Result<()> {
    match repo.get_active(user).await? {
        Some(detail) => print!("{}", PlanDetailView(&detail)),
        None => println!("No active study plan for user {user}."),
    }
    Ok(())
}

async fn cmd_deactivate(repo: &dyn PlanRepository, user: Uuid, plan_id: Uuid) -> Result<()> {
    if !repo.deactivate(user, plan_id).await? {
        bail!("study plan {plan_id} not found for user {user}");
    }
    println!("Study plan {plan_id} deactivated.");
    Ok(())
}

// -----------------------------------------------------------------------
// Rendering
// -----------------------------------------------------------------------

fn topic_suffix(topic: Option<&str>) -> String {
    topic.map(|t| format!("  ({t})")).unwrap_or_default()
}

/// One plan with its sessions grouped by day.
struct PlanDetailView<'a>(&'a PlanDetail);

impl fmt::Display for PlanDetailView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = &self.0.plan;
        writeln!(f, "Plan: {}", plan.plan_name)?;
        writeln!(f, "  ID:             {}", plan.id)?;
        writeln!(f, "  Exam:           {}", plan.target_exam)?;
        if let Some(date) = plan.exam_date {
            writeln!(f, "  Exam date:      {}", date.format("%Y-%m-%d"))?;
        }
        writeln!(
            f,
            "  Schedule:       {} h/day, {} days/week, {} weeks",
            plan.hours_per_day, plan.days_per_week, plan.weeks_until_exam
        )?;
        writeln!(f, "  Active:         {}", if plan.is_active { "yes" } else { "no" })?;
        writeln!(f, "  Completion:     {}%", plan.completion_percentage)?;
        writeln!(
            f,
            "  Created:        {}",
            plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        let sessions = &self.0.sessions;
        if sessions.is_empty() {
            return writeln!(f, "  Sessions:       none");
        }

        let subject_w = sessions.iter().map(|s| s.subject.len()).max().unwrap_or(7).max(7);
        let mut current_day = None;
        for s in sessions {
            if current_day != Some(s.day_index) {
                current_day = Some(s.day_index);
                writeln!(f)?;
                writeln!(f, "Day {} ({} min):", s.day_index + 1, day_minutes(sessions, s.day_index))?;
            }
            writeln!(
                f,
                "  {:>2}. {:<subject_w$}  {:>3} min{}",
                s.sequence + 1,
                s.subject,
                s.duration_minutes,
                topic_suffix(s.topic.as_deref()),
            )?;
        }
        Ok(())
    }
}

fn day_minutes(sessions: &[StudySession], day_index: i32) -> i32 {
    sessions
        .iter()
        .filter(|s| s.day_index == day_index)
        .map(|s| s.duration_minutes)
        .sum()
}

/// Table of plans, newest first.
struct PlanListView<'a>(&'a [StudyPlan]);

impl fmt::Display for PlanListView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ID is always 36 chars (UUID).
        let id_w = 36;
        let name_w = self.0.iter().map(|p| p.plan_name.len()).max().unwrap_or(4).max(4);
        let active_w = 6;
        let done_w = 4;

        writeln!(
            f,
            "{:<id_w$}  {:<name_w$}  {:<active_w$}  {:>done_w$}  CREATED",
            "ID", "NAME", "ACTIVE", "DONE",
        )?;
        for plan in self.0 {
            writeln!(
                f,
                "{:<id_w$}  {:<name_w$}  {:<active_w$}  {:>done_w$}  {}",
                plan.id,
                plan.plan_name,
                if plan.is_active { "yes" } else { "no" },
                format!("{}%", plan.completion_percentage),
                plan.created_at.format("%Y-%m-%d %H:%M"),
            )?;
        }
        Ok(())
    }
}

/// Warnings and unscheduled minutes, or nothing when there are none.
struct WarningsView<'a>(&'a [PlanWarning], u32);

impl fmt::Display for WarningsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let WarningsView(warnings, unscheduled) = *self;
        if warnings.is_empty() && unscheduled == 0 {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "Warnings:")?;
        for w in warnings {
            writeln!(f, "  - {w}")?;
        }
        if unscheduled > 0 {
            writeln!(f, "  - {unscheduled} minutes per week left unscheduled")?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
