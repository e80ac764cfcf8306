use crate::application::scheduler::NowProvider;
use crate::domain::models::{Goal, Occurrence, OccurrenceStatus, Task};
use crate::infrastructure::config::DEFAULT_UPCOMING_LIMIT;
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::goal_repository::GoalStore;
use crate::infrastructure::schedule_repository::ScheduleRepository;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OccurrenceView {
    pub id: String,
    pub goal_title: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub status: OccurrenceStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: String,
    pub tasks: Vec<OccurrenceView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpcomingView {
    pub id: String,
    pub goal_title: String,
    pub title: String,
    pub date: String,
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayStat {
    pub date: String,
    pub completed: i64,
    pub pending: i64,
}

struct TitleIndex {
    tasks: HashMap<String, Task>,
    goals: HashMap<String, Goal>,
}

impl TitleIndex {
    /// Resolves an occurrence to its task and goal titles; occurrences whose
    /// task or goal records have vanished are dropped from projections.
    fn resolve(&self, occurrence: &Occurrence) -> Option<(&Task, &Goal)> {
        let Some(task) = self.tasks.get(&occurrence.task_id) else {
            warn!(
                occurrence_id = %occurrence.id,
                task_id = %occurrence.task_id,
                "occurrence references a missing task"
            );
            return None;
        };
        let Some(goal) = self.goals.get(&task.goal_id) else {
            warn!(
                task_id = %task.id,
                goal_id = %task.goal_id,
                "task references a missing goal"
            );
            return None;
        };
        Some((task, goal))
    }
}

pub struct ScheduleQueryService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    schedule_repo: Arc<S>,
    goal_store: Arc<G>,
    upcoming_limit: usize,
    now_provider: NowProvider,
}

impl<S, G> ScheduleQueryService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    pub fn new(schedule_repo: Arc<S>, goal_store: Arc<G>) -> Self {
        Self {
            schedule_repo,
            goal_store,
            upcoming_limit: DEFAULT_UPCOMING_LIMIT,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_upcoming_limit(mut self, upcoming_limit: usize) -> Self {
        self.upcoming_limit = upcoming_limit;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn schedule_for_day(&self, date: NaiveDate) -> Result<DaySchedule, PlannerError> {
        let occurrences = self
            .schedule_repo
            .list_occurrences_in_range(date, date)
            .await?;
        let titles = self.load_titles(&occurrences).await?;

        let tasks = occurrences
            .iter()
            .filter_map(|occurrence| {
                titles
                    .resolve(occurrence)
                    .map(|(task, goal)| occurrence_view(occurrence, task, goal))
            })
            .collect();
        Ok(DaySchedule {
            date: date.format("%Y-%m-%d").to_string(),
            tasks,
        })
    }

    /// One entry per date in the inclusive range, empty dates included.
    pub async fn schedule_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySchedule>, PlannerError> {
        if start > end {
            return Err(PlannerError::Validation(format!(
                "invalid range: {start} > {end}"
            )));
        }
        let occurrences = self
            .schedule_repo
            .list_occurrences_in_range(start, end)
            .await?;
        let titles = self.load_titles(&occurrences).await?;

        let mut grouped: HashMap<NaiveDate, Vec<OccurrenceView>> = HashMap::new();
        for occurrence in &occurrences {
            if let Some((task, goal)) = titles.resolve(occurrence) {
                grouped
                    .entry(occurrence.date)
                    .or_default()
                    .push(occurrence_view(occurrence, task, goal));
            }
        }

        let mut schedule = Vec::new();
        let mut date = start;
        while date <= end {
            schedule.push(DaySchedule {
                date: date.format("%Y-%m-%d").to_string(),
                tasks: grouped.remove(&date).unwrap_or_default(),
            });
            date += Duration::days(1);
        }
        Ok(schedule)
    }

    /// Next occurrences across all goals from today onward; a zero limit
    /// falls back to the configured default.
    pub async fn upcoming(&self, limit: usize) -> Result<Vec<UpcomingView>, PlannerError> {
        let limit = if limit == 0 { self.upcoming_limit } else { limit };
        let today = (self.now_provider)().date_naive();
        let occurrences = self
            .schedule_repo
            .list_upcoming_occurrences(today, limit)
            .await?;
        let titles = self.load_titles(&occurrences).await?;

        Ok(occurrences
            .iter()
            .filter_map(|occurrence| {
                titles.resolve(occurrence).map(|(task, goal)| UpcomingView {
                    id: occurrence.id.clone(),
                    goal_title: goal.title.clone(),
                    title: task.title.clone(),
                    date: occurrence.date.format("%Y-%m-%d").to_string(),
                    start_time: occurrence.start_at.format("%H:%M").to_string(),
                })
            })
            .collect())
    }

    /// Completed/pending occurrence counts for the seven days ending today.
    pub async fn week_stats(&self) -> Result<Vec<DayStat>, PlannerError> {
        let today = (self.now_provider)().date_naive();
        let week_start = today - Duration::days(6);
        let counts = self
            .schedule_repo
            .count_occurrences_by_day(week_start, today)
            .await?;

        let mut stats = Vec::new();
        let mut date = week_start;
        while date <= today {
            let count = counts.get(&date).copied().unwrap_or_default();
            stats.push(DayStat {
                date: date.format("%Y-%m-%d").to_string(),
                completed: count.completed,
                pending: count.total - count.completed,
            });
            date += Duration::days(1);
        }
        Ok(stats)
    }

    async fn load_titles(&self, occurrences: &[Occurrence]) -> Result<TitleIndex, PlannerError> {
        let mut task_ids: Vec<String> = occurrences
            .iter()
            .map(|occurrence| occurrence.task_id.clone())
            .collect();
        task_ids.sort();
        task_ids.dedup();
        let tasks = self.goal_store.get_tasks_by_ids(&task_ids).await?;

        let mut goal_ids: Vec<String> = tasks.iter().map(|task| task.goal_id.clone()).collect();
        goal_ids.sort();
        goal_ids.dedup();
        let goals = self.goal_store.get_goals_by_ids(&goal_ids).await?;

        Ok(TitleIndex {
            tasks: tasks.into_iter().map(|task| (task.id.clone(), task)).collect(),
            goals: goals.into_iter().map(|goal| (goal.id.clone(), goal)).collect(),
        })
    }
}

fn occurrence_view(occurrence: &Occurrence, task: &Task, goal: &Goal) -> OccurrenceView {
    OccurrenceView {
        id: occurrence.id.clone(),
        goal_title: goal.title.clone(),
        title: task.title.clone(),
        start_time: occurrence.start_at.format("%H:%M").to_string(),
        end_time: occurrence.end_at.format("%H:%M").to_string(),
        status: occurrence.status,
    }
}
