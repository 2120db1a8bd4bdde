//! Command handlers behind the CLI subcommands.

use std::sync::Arc;

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};

use crate::api::api_types::{ApplicationFilter, NewApplication, ProfileUpdate};
use crate::api::types::{
  AiKind, AiOutput, AiPayload, Application, ApplicationStatus, Priority, Profile, ProjectItem,
};
use crate::api::RemoteStore;
use crate::board::{Board, DragEnd, MoveOutcome, NoOpReason};
use crate::cache::{CacheLayer, FetchError, QueryCache};
use crate::config::Config;
use crate::profile::{self, ProfileEditor};
use crate::reminders::{self, Reminders};
use crate::tasks::{AiTaskPanel, PollPolicy, TaskOrchestrator, TaskState};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Show the board grouped by status
  Board {
    /// Only applications with this status
    #[arg(long)]
    status: Option<ApplicationStatus>,
    /// Free-text search on company and role
    #[arg(long)]
    search: Option<String>,
  },
  /// Show one application and its generated outputs
  Show { id: String },
  /// Move a card onto a column (status name) or onto another card
  Move { id: String, target: String },
  /// Replace an application's notes
  Notes { id: String, text: String },
  /// Track a new application
  New {
    #[arg(long)]
    company: String,
    #[arg(long)]
    role: String,
    #[arg(long)]
    url: Option<String>,
    /// Raw job description text
    #[arg(long)]
    description: Option<String>,
    #[arg(long, default_value = "not_applied")]
    status: ApplicationStatus,
    #[arg(long, default_value = "medium")]
    priority: Priority,
    #[arg(long, default_value = "")]
    notes: String,
  },
  /// Run AI actions (parse-jd, match, tailor-cv, outreach, interview-prep)
  Ai {
    id: String,
    #[arg(required = true)]
    kinds: Vec<AiKind>,
  },
  #[command(subcommand)]
  Reminders(ReminderCommand),
  /// The background AI actions score applications against
  #[command(subcommand)]
  Profile(ProfileCommand),
}

#[derive(Subcommand, Debug)]
pub enum ReminderCommand {
  List {
    /// Show completed reminders instead of open ones
    #[arg(long)]
    done: bool,
  },
  Add {
    application_id: String,
    text: String,
    /// YYYY-MM-DD or YYYY-MM-DDTHH:MM in local time, or RFC 3339
    due: String,
  },
  Done { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
  Show,
  /// Update the given fields, keeping the rest
  Set {
    #[arg(long)]
    headline: Option<String>,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long)]
    location: Option<String>,
    /// Comma separated
    #[arg(long)]
    skills: Option<String>,
    /// JSON array of {name, stack, bullets, metrics}
    #[arg(long)]
    projects: Option<String>,
  },
}

/// Shared handles for one invocation
pub struct Context {
  pub config: Config,
  pub store: Arc<dyn RemoteStore>,
  pub cache: QueryCache,
}

impl Context {
  fn board(&self, filter: ApplicationFilter) -> Board {
    Board::filtered(
      Arc::clone(&self.store),
      self.cache.clone(),
      self.config.board.clone(),
      filter,
    )
  }

  fn panel(&self, application_id: &str) -> AiTaskPanel {
    let orchestrator = TaskOrchestrator::new(
      Arc::clone(&self.store),
      self.cache.clone(),
      PollPolicy::from(self.config.polling),
    );
    AiTaskPanel::new(
      orchestrator,
      Arc::clone(&self.store),
      CacheLayer::new(self.cache.clone()),
      application_id,
    )
  }
}

pub async fn run(ctx: &Context, command: Command) -> Result<()> {
  match command {
    Command::Board { status, search } => show_board(ctx, ApplicationFilter { status, search }).await,
    Command::Show { id } => show_application(ctx, &id).await,
    Command::Move { id, target } => move_card(ctx, id, target).await,
    Command::Notes { id, text } => {
      let board = ctx.board(ApplicationFilter::default());
      let updated = board.update_notes(&id, &text).await?;
      println!("Notes saved for {} at {}", card_title(&updated), updated.company_name());
      Ok(())
    }
    Command::New {
      company,
      role,
      url,
      description,
      status,
      priority,
      notes,
    } => {
      let body = NewApplication {
        job_url: url,
        job_description: description,
        status,
        priority,
        notes,
        ..NewApplication::new(company, role)
      };
      let board = ctx.board(ApplicationFilter::default());
      let created = board.create(body).await?;
      println!("Created {} ({})", card_title(&created), created.id);
      Ok(())
    }
    Command::Ai { id, kinds } => run_ai(ctx, &id, &kinds).await,
    Command::Reminders(cmd) => run_reminders(ctx, cmd).await,
    Command::Profile(cmd) => run_profile(ctx, cmd).await,
  }
}

fn card_title(app: &Application) -> String {
  format!("{} @ {}", app.role(), app.company_name())
}

async fn show_board(ctx: &Context, filter: ApplicationFilter) -> Result<()> {
  let board = ctx.board(filter);
  board.load().await?;

  for column in board.columns()? {
    println!("{} ({})", column.status.label(), column.cards.len());
    for card in &column.cards {
      println!("  {}  {} [{:?}]", card.id, card_title(card), card.priority);
    }
  }

  let summary = board.summary()?;
  println!(
    "\n{} total, {} applied, {} interviewing, {} offers",
    summary.total, summary.applied, summary.interviewing, summary.offers
  );
  Ok(())
}

async fn show_application(ctx: &Context, id: &str) -> Result<()> {
  let board = ctx.board(ApplicationFilter::default());
  let app = match board.detail(id).await {
    Ok(app) => app,
    Err(FetchError::Store(err)) if err.is_not_found() => {
      return Err(eyre!("No application with id {}", id))
    }
    Err(err) => return Err(err.into()),
  };
  println!("{}", card_title(&app));
  println!("Status:   {}", app.status.label());
  println!("Priority: {:?}", app.priority);
  if let Some(followup) = &app.next_followup_at {
    println!("Follow up: {}", followup);
  }
  if !app.notes.is_empty() {
    println!("\n{}", app.notes);
  }

  let panel = ctx.panel(id);
  let outputs = panel.outputs().await?;
  for output in &outputs.data {
    println!("\n[{}] {}", output.kind, describe_output(output));
  }
  Ok(())
}

async fn move_card(ctx: &Context, id: String, target: String) -> Result<()> {
  let board = ctx.board(ApplicationFilter::default());
  board.load().await?;

  let outcome = board
    .on_drag_end(DragEnd {
      dragged_id: id.clone(),
      over_id: Some(target.clone()),
    })
    .await;
  match outcome {
    MoveOutcome::Confirmed(app) => {
      println!("{} moved to {}", card_title(&app), app.status.label());
      Ok(())
    }
    MoveOutcome::NoOp(NoOpReason::SameStatus) => {
      println!("Already in that column");
      Ok(())
    }
    MoveOutcome::NoOp(NoOpReason::UnknownCard) => Err(eyre!("No application with id {}", id)),
    MoveOutcome::NoOp(reason) => Err(eyre!("Cannot move onto '{}': {:?}", target, reason)),
    MoveOutcome::RolledBack(err) => Err(eyre!(
      "{}",
      board.error().unwrap_or_else(|| err.to_string())
    )),
    MoveOutcome::Superseded => Ok(()),
    MoveOutcome::Failed(err) => Err(err.into()),
  }
}

async fn run_ai(ctx: &Context, id: &str, kinds: &[AiKind]) -> Result<()> {
  let panel = ctx.panel(id);
  // Keeps the outputs entry alive so a successful task refreshes it
  panel.outputs().await?;

  let outcomes = tokio::select! {
    outcomes = panel.run_all(kinds) => outcomes,
    _ = tokio::signal::ctrl_c() => {
      for kind in kinds {
        panel.cancel(*kind);
      }
      return Err(eyre!("Interrupted; running actions were cancelled"));
    }
  };
  let mut failed = 0;
  for (kind, outcome) in kinds.iter().zip(&outcomes) {
    match &outcome.state {
      TaskState::Success { .. } => match panel.latest(*kind).await? {
        Some(output) => println!("[{}] {}", kind, describe_output(&output)),
        None => println!("[{}] done", kind),
      },
      TaskState::Timeout { polls, .. } => {
        failed += 1;
        println!("[{}] still running after {} checks; try again later", kind, polls);
      }
      other => {
        failed += 1;
        println!("[{}] {}", kind, other);
      }
    }
  }

  if failed > 0 {
    return Err(eyre!("{} of {} actions did not complete", failed, kinds.len()));
  }
  Ok(())
}

async fn run_reminders(ctx: &Context, cmd: ReminderCommand) -> Result<()> {
  let reminders = Reminders::new(Arc::clone(&ctx.store), CacheLayer::new(ctx.cache.clone()));
  match cmd {
    ReminderCommand::List { done } => {
      let now = chrono::Utc::now();
      for r in reminders.list(Some(done)).await? {
        let flag = if reminders::is_overdue(&r, now) { " (overdue)" } else { "" };
        println!("{}  {}  {}{}", r.id, r.due_at, r.text, flag);
      }
    }
    ReminderCommand::Add {
      application_id,
      text,
      due,
    } => {
      let due = reminders::parse_due(&due, &chrono::Local)?;
      let created = reminders.create(&application_id, &text, due).await?;
      println!("Reminder {} due {}", created.id, created.due_at);
    }
    ReminderCommand::Done { id } => {
      reminders.mark_done(&id).await?;
      println!("Reminder {} done", id);
    }
  }
  Ok(())
}

async fn run_profile(ctx: &Context, cmd: ProfileCommand) -> Result<()> {
  let editor = ProfileEditor::new(Arc::clone(&ctx.store), CacheLayer::new(ctx.cache.clone()));
  let profile = match cmd {
    ProfileCommand::Show => match editor.get().await {
      Ok(fetched) => fetched.data,
      Err(FetchError::Store(err)) if err.is_not_found() => {
        println!("No profile yet; create one with `applytrack profile set`");
        return Ok(());
      }
      Err(err) => return Err(err.into()),
    },
    ProfileCommand::Set {
      headline,
      summary,
      location,
      skills,
      projects,
    } => {
      let projects_json = projects
        .map(|raw| serde_json::from_str::<Vec<ProjectItem>>(&raw))
        .transpose()
        .map_err(|e| eyre!("Invalid projects JSON: {}", e))?;
      let update = ProfileUpdate {
        headline,
        summary,
        location,
        skills_json: skills.as_deref().map(profile::parse_skills),
        projects_json,
        ..ProfileUpdate::default()
      };
      editor.update(&update).await?
    }
  };
  print_profile(&profile);
  Ok(())
}

fn print_profile(profile: &Profile) {
  println!("{}", profile.headline.as_deref().unwrap_or("(no headline)"));
  if let Some(location) = &profile.location {
    println!("Location: {}", location);
  }
  if !profile.skills().is_empty() {
    println!("Skills:   {}", profile.skills().join(", "));
  }
  if let Some(summary) = &profile.summary {
    println!("\n{}", summary);
  }
  for project in profile.projects() {
    println!("\n{} ({})", project.name, project.stack);
    for bullet in &project.bullets {
      println!("  - {}", bullet);
    }
  }
  for job in profile.experience() {
    let end = job.end_date.as_deref().unwrap_or("present");
    println!("\n{} @ {} ({} to {})", job.role, job.company, job.start_date, end);
  }
}

/// One-line summary of a generated output
pub fn describe_output(output: &AiOutput) -> String {
  match output.payload() {
    Ok(AiPayload::ParsedJd(jd)) => format!(
      "{} ({} must-have skills, {} keywords)",
      jd.role_title,
      jd.must_have_skills.len(),
      jd.keywords.len()
    ),
    Ok(AiPayload::Match(m)) => format!(
      "match score {}/100, {} strengths, {} gaps",
      m.match_score,
      m.strong_matches.len(),
      m.gaps.len()
    ),
    Ok(AiPayload::TailoredCv(cv)) => format!(
      "{} bullet suggestions; {}",
      cv.bullet_suggestions.len(),
      cv.tailored_summary
    ),
    Ok(AiPayload::Outreach(o)) => o.email_message.lines().next().unwrap_or_default().to_string(),
    Ok(AiPayload::InterviewPrep(p)) => format!(
      "{} likely questions, {} stories",
      p.likely_questions.len(),
      p.suggested_stories.len()
    ),
    Err(e) => format!("unreadable output: {}", e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;
  use serde_json::json;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("applytrack").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_ai_kinds_accept_either_spelling() {
    match parse(&["ai", "app-1", "match", "tailor_cv"]) {
      Command::Ai { id, kinds } => {
        assert_eq!(id, "app-1");
        assert_eq!(kinds, vec![AiKind::Match, AiKind::TailorCv]);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_new_defaults() {
    match parse(&["new", "--company", "Acme", "--role", "SRE"]) {
      Command::New { status, priority, .. } => {
        assert_eq!(status, ApplicationStatus::NotApplied);
        assert_eq!(priority, Priority::Medium);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_profile_set_parses_optional_fields() {
    match parse(&["profile", "set", "--skills", "Rust, SQL", "--location", "Remote"]) {
      Command::Profile(ProfileCommand::Set {
        headline,
        location,
        skills,
        projects,
        ..
      }) => {
        assert_eq!(headline, None);
        assert_eq!(location.as_deref(), Some("Remote"));
        assert_eq!(skills.as_deref(), Some("Rust, SQL"));
        assert_eq!(projects, None);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_unknown_status_is_rejected() {
    let parsed = Cli::try_parse_from(["applytrack", "board", "--status", "ghosted"]);
    assert!(parsed.is_err());
  }

  #[test]
  fn test_describe_match_output() {
    let output = AiOutput {
      id: "o1".into(),
      kind: AiKind::Match,
      output_json: json!({
        "match_score": 81,
        "strong_matches": [{ "item": "Rust", "evidence": null }],
        "gaps": []
      }),
      evidence_json: None,
      model: String::new(),
      latency_seconds: 0.0,
      created_at: String::new(),
    };
    assert_eq!(describe_output(&output), "match score 81/100, 1 strengths, 0 gaps");
  }

  #[test]
  fn test_describe_malformed_output() {
    let output = AiOutput {
      id: "o1".into(),
      kind: AiKind::ParseJd,
      output_json: json!({ "unexpected": true }),
      evidence_json: None,
      model: String::new(),
      latency_seconds: 0.0,
      created_at: String::new(),
    };
    assert!(describe_output(&output).starts_with("unreadable output"));
  }
}
