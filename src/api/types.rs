use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Pipeline stage of an application.
///
/// `NotApplied < Applied < Interview < Offer` form the ordered pipeline;
/// `Rejected` and `Archived` are terminal and sit outside that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
  NotApplied,
  Applied,
  Interview,
  Offer,
  Rejected,
  Archived,
}

/// Board column order
pub const KANBAN_COLUMNS: [ApplicationStatus; 6] = [
  ApplicationStatus::NotApplied,
  ApplicationStatus::Applied,
  ApplicationStatus::Interview,
  ApplicationStatus::Offer,
  ApplicationStatus::Rejected,
  ApplicationStatus::Archived,
];

impl ApplicationStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotApplied => "not_applied",
      Self::Applied => "applied",
      Self::Interview => "interview",
      Self::Offer => "offer",
      Self::Rejected => "rejected",
      Self::Archived => "archived",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::NotApplied => "Not Applied",
      Self::Applied => "Applied",
      Self::Interview => "Interview",
      Self::Offer => "Offer",
      Self::Rejected => "Rejected",
      Self::Archived => "Archived",
    }
  }

  /// Position in the ordered pipeline; `None` for terminal statuses.
  pub fn stage(&self) -> Option<u8> {
    match self {
      Self::NotApplied => Some(0),
      Self::Applied => Some(1),
      Self::Interview => Some(2),
      Self::Offer => Some(3),
      Self::Rejected | Self::Archived => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.stage().is_none()
  }
}

impl fmt::Display for ApplicationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ApplicationStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    KANBAN_COLUMNS
      .iter()
      .copied()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| format!("unknown status '{}'", s))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "low" => Ok(Self::Low),
      "medium" => Ok(Self::Medium),
      "high" => Ok(Self::High),
      other => Err(format!("unknown priority '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
  #[default]
  Onsite,
  Hybrid,
  Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
  pub id: String,
  pub name: String,
  pub website_url: Option<String>,
  pub hq_location: Option<String>,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
  pub id: String,
  pub title: String,
  pub company_id: Option<String>,
  pub location: Option<String>,
  #[serde(default)]
  pub remote_type: RemoteType,
  pub posting_url: Option<String>,
  #[serde(default)]
  pub source: String,
  pub description_raw: Option<String>,
  #[serde(default)]
  pub created_at: String,
  pub company: Option<Company>,
}

/// A tracked application, with its posting denormalized in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
  pub id: String,
  #[serde(default)]
  pub user_id: String,
  #[serde(default)]
  pub job_posting_id: String,
  pub status: ApplicationStatus,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default)]
  pub notes: String,
  pub applied_at: Option<String>,
  pub next_followup_at: Option<String>,
  pub salary_expectation: Option<i64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
  pub job_posting: Option<JobPosting>,
}

impl Application {
  pub fn company_name(&self) -> &str {
    self
      .job_posting
      .as_ref()
      .and_then(|p| p.company.as_ref())
      .map(|c| c.name.as_str())
      .unwrap_or("Unknown Company")
  }

  pub fn role(&self) -> &str {
    self
      .job_posting
      .as_ref()
      .map(|p| p.title.as_str())
      .unwrap_or("Unknown Role")
  }
}

/// Kinds of AI artifact the backend can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiKind {
  ParseJd,
  Match,
  TailorCv,
  Outreach,
  InterviewPrep,
}

impl AiKind {
  pub const ALL: [AiKind; 5] = [
    AiKind::ParseJd,
    AiKind::Match,
    AiKind::TailorCv,
    AiKind::Outreach,
    AiKind::InterviewPrep,
  ];

  /// Path segment used by the submission endpoint
  pub fn slug(&self) -> &'static str {
    match self {
      Self::ParseJd => "parse-jd",
      Self::Match => "match",
      Self::TailorCv => "tailor-cv",
      Self::Outreach => "outreach",
      Self::InterviewPrep => "interview-prep",
    }
  }
}

impl fmt::Display for AiKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

impl FromStr for AiKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace('_', "-");
    AiKind::ALL
      .iter()
      .copied()
      .find(|kind| kind.slug() == normalized)
      .ok_or_else(|| format!("unknown AI action '{}'", s))
  }
}

/// A generated artifact attached to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiOutput {
  pub id: String,
  pub kind: AiKind,
  pub output_json: serde_json::Value,
  pub evidence_json: Option<serde_json::Value>,
  #[serde(default)]
  pub model: String,
  #[serde(default)]
  pub latency_seconds: f64,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
  pub id: String,
  pub application_id: String,
  #[serde(default)]
  pub user_id: String,
  pub text: String,
  pub due_at: String,
  #[serde(default)]
  pub done: bool,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
  pub name: String,
  pub stack: String,
  #[serde(default)]
  pub bullets: Vec<String>,
  #[serde(default)]
  pub metrics: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceItem {
  pub company: String,
  pub role: String,
  pub start_date: String,
  #[serde(default)]
  pub end_date: Option<String>,
  #[serde(default)]
  pub bullets: Vec<String>,
}

/// The user's own background; AI matching and CV tailoring draw on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  #[serde(default)]
  pub user_id: String,
  pub headline: Option<String>,
  pub summary: Option<String>,
  pub location: Option<String>,
  pub links_json: Option<BTreeMap<String, String>>,
  pub skills_json: Option<Vec<String>>,
  pub projects_json: Option<Vec<ProjectItem>>,
  pub experience_json: Option<Vec<ExperienceItem>>,
}

impl Profile {
  pub fn skills(&self) -> &[String] {
    self.skills_json.as_deref().unwrap_or_default()
  }

  pub fn projects(&self) -> &[ProjectItem] {
    self.projects_json.as_deref().unwrap_or_default()
  }

  pub fn experience(&self) -> &[ExperienceItem] {
    self.experience_json.as_deref().unwrap_or_default()
  }
}

// ============================================================================
// Typed AI payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvidenceSnippet {
  pub source: String,
  pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkillItem {
  pub name: String,
  pub evidence: Option<EvidenceSnippet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchItem {
  pub item: String,
  pub evidence: Option<EvidenceSnippet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CvBullet {
  pub bullet: String,
  pub evidence: Option<EvidenceSnippet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoryItem {
  pub question: String,
  pub suggested_answer: String,
  pub evidence: Option<EvidenceSnippet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParsedJd {
  pub role_title: String,
  pub seniority: Option<String>,
  #[serde(default)]
  pub must_have_skills: Vec<SkillItem>,
  #[serde(default)]
  pub nice_to_have_skills: Vec<SkillItem>,
  #[serde(default)]
  pub responsibilities: Vec<String>,
  #[serde(default)]
  pub keywords: Vec<String>,
  #[serde(default)]
  pub questions_to_ask: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchResult {
  pub match_score: u8,
  #[serde(default)]
  pub strong_matches: Vec<MatchItem>,
  #[serde(default)]
  pub gaps: Vec<MatchItem>,
  #[serde(default)]
  pub recommended_projects: Vec<String>,
  #[serde(default)]
  pub recommended_experience: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TailoredCv {
  #[serde(default)]
  pub tailored_summary: String,
  #[serde(default)]
  pub bullet_suggestions: Vec<CvBullet>,
  #[serde(default)]
  pub top_keywords: Vec<String>,
  #[serde(default)]
  pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutreachResult {
  #[serde(default)]
  pub linkedin_message: String,
  #[serde(default)]
  pub email_message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterviewPrep {
  #[serde(default)]
  pub likely_questions: Vec<String>,
  #[serde(default)]
  pub checklist: Vec<String>,
  #[serde(default)]
  pub suggested_stories: Vec<StoryItem>,
}

/// `output_json` decoded according to the output's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AiPayload {
  ParsedJd(ParsedJd),
  Match(MatchResult),
  TailoredCv(TailoredCv),
  Outreach(OutreachResult),
  InterviewPrep(InterviewPrep),
}

impl AiOutput {
  pub fn payload(&self) -> serde_json::Result<AiPayload> {
    let value = self.output_json.clone();
    Ok(match self.kind {
      AiKind::ParseJd => AiPayload::ParsedJd(serde_json::from_value(value)?),
      AiKind::Match => AiPayload::Match(serde_json::from_value(value)?),
      AiKind::TailorCv => AiPayload::TailoredCv(serde_json::from_value(value)?),
      AiKind::Outreach => AiPayload::Outreach(serde_json::from_value(value)?),
      AiKind::InterviewPrep => AiPayload::InterviewPrep(serde_json::from_value(value)?),
    })
  }
}
