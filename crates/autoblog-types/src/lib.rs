use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Generation Settings ────────────────────

/// Requested resolution tier for generated cover images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageQuality {
    #[default]
    #[serde(rename = "1K")]
    Standard,
    #[serde(rename = "2K")]
    High,
    #[serde(rename = "4K")]
    Ultra,
}

impl ImageQuality {
    /// Size hint understood by the image model ("1K", "2K", "4K").
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "1K",
            ImageQuality::High => "2K",
            ImageQuality::Ultra => "4K",
        }
    }
}

impl fmt::Display for ImageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output language for generated articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Arabic,
    English,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Arabic => f.write_str("Arabic"),
            Language::English => f.write_str("English"),
        }
    }
}

/// Settings snapshot an autopilot run generates articles with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Subject area the whole blog revolves around.
    #[serde(default)]
    pub niche: String,
    /// Free-form keywords the topic analysis must take into account.
    #[serde(default)]
    pub keywords: String,
    /// Daily article target.
    #[serde(default = "default_articles_per_day")]
    pub articles_per_day: u32,
    #[serde(default)]
    pub image_quality: ImageQuality,
    #[serde(default)]
    pub language: Language,
    /// Visual style instructions forwarded to the image prompt.
    #[serde(default = "default_image_style")]
    pub image_style: String,
    /// Publish generated posts immediately instead of keeping them as drafts.
    #[serde(default = "default_true")]
    pub auto_publish: bool,
}

fn default_articles_per_day() -> u32 {
    1
}

fn default_image_style() -> String {
    "Professional, cinematic, photorealistic".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            niche: String::new(),
            keywords: String::new(),
            articles_per_day: default_articles_per_day(),
            image_quality: ImageQuality::default(),
            language: Language::default(),
            image_style: default_image_style(),
            auto_publish: true,
        }
    }
}

// ──────────────────── Posts ────────────────────

/// Visibility of a post on the public blog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Published,
    Draft,
}

impl PostStatus {
    pub fn from_auto_publish(auto_publish: bool) -> Self {
        if auto_publish {
            PostStatus::Published
        } else {
            PostStatus::Draft
        }
    }
}

/// Visit counters per acquisition channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSources {
    pub search: u64,
    pub social: u64,
    pub direct: u64,
    pub referral: u64,
}

/// A blog article, either written by hand or produced by a generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    /// HTML body.
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub status: PostStatus,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub traffic_sources: TrafficSources,
}

// ──────────────────── Log Entries ────────────────────

/// Severity/category of an autopilot log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
    System,
}

/// One line of the autopilot audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        }
    }

    /// Same entry, stamped with `timestamp` instead of the wall clock.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(LogKind::System, message)
    }
}

// ──────────────────── Job & Run States ────────────────────

/// Stage of a single generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    PickingTopic,
    Writing,
    RenderingImage,
    Persisting,
    Done,
    Error,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::PickingTopic => "picking topic",
            JobStage::Writing => "writing",
            JobStage::RenderingImage => "rendering image",
            JobStage::Persisting => "persisting",
            JobStage::Done => "done",
            JobStage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Coarse state of an autopilot run, as shown to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    /// A generation job is in flight.
    Working(JobStage),
    /// Armed and waiting for the next slot.
    Waiting,
    /// Quota reached (for the day, or for the whole single-session run).
    Complete,
    Error,
}

impl RunState {
    /// True while a job runs or the next one is pending.
    pub fn is_busy(&self) -> bool {
        matches!(self, RunState::Working(_) | RunState::Waiting)
    }
}

/// Current schema version of the persisted [`JobState`] record.
pub const JOB_STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    JOB_STATE_VERSION
}

/// Persisted record of one autopilot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Bumped on every fresh start; a job only writes to the run it began in.
    #[serde(default)]
    pub run_id: u64,
    pub running: bool,
    pub articles_per_day: u32,
    pub articles_generated_today: u32,
    /// Local calendar date progress last advanced on.
    #[serde(default)]
    pub last_run_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: GenerationSettings,
    #[serde(default)]
    pub run_state: RunState,
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            version: JOB_STATE_VERSION,
            run_id: 0,
            running: false,
            articles_per_day: default_articles_per_day(),
            articles_generated_today: 0,
            last_run_date: None,
            next_run_at: None,
            settings: GenerationSettings::default(),
            run_state: RunState::Idle,
            log_entries: Vec::new(),
        }
    }
}

impl JobState {
    /// Fresh state for a newly started run.
    pub fn started(settings: GenerationSettings, next_run_at: DateTime<Utc>) -> Self {
        Self {
            running: true,
            articles_per_day: settings.articles_per_day.max(1),
            next_run_at: Some(next_run_at),
            settings,
            run_state: RunState::Waiting,
            ..Self::default()
        }
    }

    /// Reset the daily counter when `today` differs from the last run date.
    /// Returns true when a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_run_date == Some(today) || self.articles_generated_today == 0 {
            return false;
        }
        self.articles_generated_today = 0;
        true
    }

    /// Whether today's quota is exhausted.
    pub fn quota_met(&self) -> bool {
        self.articles_generated_today >= self.articles_per_day
    }

    /// Count one article published at `at` (local date `today`).
    pub fn record_published(&mut self, at: DateTime<Utc>, today: NaiveDate, title: &str) {
        self.roll_over(today);
        self.articles_generated_today = (self.articles_generated_today + 1).min(self.articles_per_day);
        self.last_run_date = Some(today);
        self.push_log(LogEntry::success(format!("Published: {title}")).at(at));
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.log_entries.push(entry);
    }

    /// Keep only the newest `max` log entries.
    pub fn trim_log(&mut self, max: usize) {
        if self.log_entries.len() > max {
            let excess = self.log_entries.len() - max;
            self.log_entries.drain(..excess);
        }
    }
}
