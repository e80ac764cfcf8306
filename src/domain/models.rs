use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Planning,
    Active,
    Completed,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn from_progress(progress: i64) -> Self {
        if progress == 100 {
            Self::Completed
        } else {
            Self::Active
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn from_progress(progress: i64) -> Self {
        match progress {
            0 => Self::NotStarted,
            100 => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn from_progress(progress: i64) -> Self {
        match progress {
            0 => Self::Todo,
            100 => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Scheduled,
    Completed,
}

impl OccurrenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    /// Estimated effort in hours.
    pub estimated_time: i64,
    pub progress: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "goal.id")?;
        validate_non_empty(&self.title, "goal.title")?;
        if self.estimated_time < 0 {
            return Err("goal.estimated_time must be >= 0".to_string());
        }
        validate_percent(self.progress, "goal.progress")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phase {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    pub description: String,
    pub status: PhaseStatus,
    /// Estimated effort in hours.
    pub estimated_time: i64,
    pub progress: i64,
    pub position: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Phase {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "phase.id")?;
        validate_non_empty(&self.goal_id, "phase.goal_id")?;
        validate_non_empty(&self.title, "phase.title")?;
        validate_percent(self.progress, "phase.progress")
    }

    /// First entry into an active state; never cleared afterwards.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// First completion; never cleared afterwards.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.mark_started(now);
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub goal_id: String,
    pub phase_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Estimated effort in hours; scheduling converts to minutes once.
    pub estimated_time: i64,
    /// Completed minutes, recomputed from occurrences by the cascade.
    pub time_spent: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.goal_id, "task.goal_id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.estimated_time < 0 {
            return Err("task.estimated_time must be >= 0".to_string());
        }
        if self.time_spent < 0 {
            return Err("task.time_spent must be >= 0".to_string());
        }
        Ok(())
    }

    pub fn estimated_minutes(&self) -> i64 {
        self.estimated_time * 60
    }

    pub fn progress_percent(&self) -> i64 {
        progress_percent(self.time_spent, self.estimated_minutes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub id: String,
    pub goal_id: String,
    pub day_of_week: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Availability {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "availability.id")?;
        validate_non_empty(&self.goal_id, "availability.goal_id")?;
        if self.day_of_week > 6 {
            return Err(format!("invalid day_of_week: {}", self.day_of_week));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub id: String,
    pub availability_id: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "time_slot.id")?;
        validate_non_empty(&self.availability_id, "time_slot.availability_id")?;
        if self.start_time >= self.end_time {
            return Err(format!(
                "time_slot start_time >= end_time: {} - {}",
                self.start_time.format("%H:%M"),
                self.end_time.format("%H:%M")
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub id: String,
    pub task_id: String,
    pub time_slot_id: String,
    pub date: NaiveDate,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: OccurrenceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "occurrence.id")?;
        validate_non_empty(&self.task_id, "occurrence.task_id")?;
        validate_non_empty(&self.time_slot_id, "occurrence.time_slot_id")?;
        if self.end_at <= self.start_at {
            return Err("occurrence.end_at must be after occurrence.start_at".to_string());
        }
        Ok(())
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }
}

/// `min(spent * 100 / estimated, 100)` with integer division; 0 when there is
/// nothing estimated.
pub fn progress_percent(spent_minutes: i64, estimated_minutes: i64) -> i64 {
    if estimated_minutes <= 0 {
        return 0;
    }
    (spent_minutes.max(0) * 100 / estimated_minutes).min(100)
}

pub fn aggregate_progress<'a, I>(tasks: I) -> i64
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut spent = 0;
    let mut estimated = 0;
    for task in tasks {
        spent += task.time_spent;
        estimated += task.estimated_minutes();
    }
    progress_percent(spent, estimated)
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn combine_date_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_percent(value: i64, field_name: &str) -> Result<(), String> {
    if !(0..=100).contains(&value) {
        return Err(format!("{field_name} must be within 0..=100"));
    }
    Ok(())
}
