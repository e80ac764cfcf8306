use crate::application::scheduler::NowProvider;
use crate::domain::models::{
    aggregate_progress, GoalStatus, OccurrenceStatus, PhaseStatus, TaskStatus,
};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::goal_repository::GoalStore;
use crate::infrastructure::schedule_repository::ScheduleRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct ProgressService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    schedule_repo: Arc<S>,
    goal_store: Arc<G>,
    now_provider: NowProvider,
}

impl<S, G> ProgressService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    pub fn new(schedule_repo: Arc<S>, goal_store: Arc<G>) -> Self {
        Self {
            schedule_repo,
            goal_store,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Toggles one occurrence's done state and cascades the recomputation
    /// through task, phase and goal. Every level recomputes from the full
    /// source set, so re-running with no further toggles is a no-op.
    pub async fn toggle_occurrence(
        &self,
        occurrence_id: &str,
        done: bool,
    ) -> Result<(), PlannerError> {
        let now = (self.now_provider)();
        let status = if done {
            OccurrenceStatus::Completed
        } else {
            OccurrenceStatus::Scheduled
        };
        self.schedule_repo
            .update_occurrence_status(occurrence_id, status, now)
            .await?;
        debug!(occurrence_id, status = status.as_str(), "occurrence toggled");

        let occurrence = self.schedule_repo.get_occurrence(occurrence_id).await?;
        let spent = self
            .schedule_repo
            .sum_completed_minutes_for_task(&occurrence.task_id)
            .await?;
        self.cascade(&occurrence.task_id, spent, now).await
    }

    async fn cascade(
        &self,
        task_id: &str,
        spent_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        let mut task = self.goal_store.get_task(task_id).await?;
        task.time_spent = spent_minutes;
        let task_progress = task.progress_percent();
        task.status = TaskStatus::from_progress(task_progress);
        if task.status == TaskStatus::Completed && task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
        task.updated_at = now;
        self.goal_store.update_task(&task).await?;
        debug!(
            task_id,
            spent_minutes,
            progress = task_progress,
            status = task.status.as_str(),
            "task recomputed"
        );

        // The reload sees the task update above; each level aggregates
        // committed data from the level below.
        let all_tasks = self.goal_store.list_tasks_by_goal(&task.goal_id).await?;

        if let Some(phase_id) = task.phase_id.as_deref() {
            let mut phase = self.goal_store.get_phase(phase_id).await?;
            phase.progress = aggregate_progress(
                all_tasks
                    .iter()
                    .filter(|candidate| candidate.phase_id.as_deref() == Some(phase_id)),
            );
            phase.status = PhaseStatus::from_progress(phase.progress);
            match phase.status {
                PhaseStatus::Completed => phase.mark_completed(now),
                PhaseStatus::InProgress => phase.mark_started(now),
                PhaseStatus::NotStarted => {}
            }
            phase.updated_at = now;
            self.goal_store.update_phase(&phase).await?;
            debug!(
                phase_id,
                progress = phase.progress,
                status = phase.status.as_str(),
                "phase recomputed"
            );
        }

        let mut goal = self.goal_store.get_goal(&task.goal_id).await?;
        goal.progress = aggregate_progress(all_tasks.iter());
        goal.status = GoalStatus::from_progress(goal.progress);
        goal.updated_at = now;
        self.goal_store.update_goal(&goal).await?;
        debug!(
            goal_id = %task.goal_id,
            progress = goal.progress,
            status = goal.status.as_str(),
            "goal recomputed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        combine_date_time, parse_hhmm, Goal, Occurrence, Phase, Task,
    };
    use crate::infrastructure::goal_repository::InMemoryGoalStore;
    use crate::infrastructure::schedule_repository::InMemoryScheduleRepository;
    use chrono::NaiveDate;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-06T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn occurrence(id: &str, task_id: &str, day: &str, start: &str, end: &str) -> Occurrence {
        let day = date(day);
        Occurrence {
            id: id.to_string(),
            task_id: task_id.to_string(),
            time_slot_id: "slot-1".to_string(),
            date: day,
            start_at: combine_date_time(day, parse_hhmm(start).expect("valid time")),
            end_at: combine_date_time(day, parse_hhmm(end).expect("valid time")),
            status: OccurrenceStatus::Scheduled,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    struct Fixture {
        service: ProgressService<InMemoryScheduleRepository, InMemoryGoalStore>,
        schedule_repo: Arc<InMemoryScheduleRepository>,
        goal_store: Arc<InMemoryGoalStore>,
    }

    /// One goal, one phase, one 3h task with a 60-minute Monday occurrence
    /// and a 120-minute Wednesday occurrence.
    async fn fixture() -> Fixture {
        let schedule_repo = Arc::new(InMemoryScheduleRepository::default());
        let goal_store = Arc::new(InMemoryGoalStore::default());

        goal_store
            .create_goal(&Goal {
                id: "goal-1".to_string(),
                user_id: "usr-1".to_string(),
                title: "Learn Rust".to_string(),
                description: String::new(),
                status: GoalStatus::Active,
                estimated_time: 3,
                progress: 0,
                created_at: fixed_now(),
                updated_at: fixed_now(),
            })
            .await
            .expect("create goal");
        goal_store
            .create_phase(&Phase {
                id: "phs-1".to_string(),
                goal_id: "goal-1".to_string(),
                title: "Fundamentals".to_string(),
                description: String::new(),
                status: PhaseStatus::NotStarted,
                estimated_time: 3,
                progress: 0,
                position: 0,
                started_at: None,
                completed_at: None,
                created_at: fixed_now(),
                updated_at: fixed_now(),
            })
            .await
            .expect("create phase");
        goal_store
            .create_task(&Task {
                id: "tsk-1".to_string(),
                goal_id: "goal-1".to_string(),
                phase_id: Some("phs-1".to_string()),
                title: "Read the book".to_string(),
                description: String::new(),
                status: TaskStatus::Todo,
                estimated_time: 3,
                time_spent: 0,
                completed_at: None,
                created_at: fixed_now(),
                updated_at: fixed_now(),
            })
            .await
            .expect("create task");

        schedule_repo
            .insert_occurrences(&[
                occurrence("occ-mon", "tsk-1", "2026-03-02", "09:00", "10:00"),
                occurrence("occ-wed", "tsk-1", "2026-03-04", "09:00", "11:00"),
            ])
            .await
            .expect("insert occurrences");

        let service = ProgressService::new(Arc::clone(&schedule_repo), Arc::clone(&goal_store))
            .with_now_provider(Arc::new(fixed_now));
        Fixture {
            service,
            schedule_repo,
            goal_store,
        }
    }

    #[tokio::test]
    async fn completing_the_wednesday_occurrence_yields_66_percent() {
        let fixture = fixture().await;
        fixture
            .service
            .toggle_occurrence("occ-wed", true)
            .await
            .expect("toggle");

        let toggled = fixture
            .schedule_repo
            .get_occurrence("occ-wed")
            .await
            .expect("occurrence");
        assert_eq!(toggled.status, OccurrenceStatus::Completed);

        let task = fixture.goal_store.get_task("tsk-1").await.expect("task");
        assert_eq!(task.time_spent, 120);
        assert_eq!(task.progress_percent(), 66);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.completed_at.is_none());

        let phase = fixture.goal_store.get_phase("phs-1").await.expect("phase");
        assert_eq!(phase.progress, 66);
        assert_eq!(phase.status, PhaseStatus::InProgress);
        assert!(phase.started_at.is_some());
        assert!(phase.completed_at.is_none());

        let goal = fixture.goal_store.get_goal("goal-1").await.expect("goal");
        assert_eq!(goal.progress, 66);
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn cascade_is_idempotent() {
        let fixture = fixture().await;
        fixture
            .service
            .toggle_occurrence("occ-wed", true)
            .await
            .expect("first toggle");

        let task_before = fixture.goal_store.get_task("tsk-1").await.expect("task");
        let phase_before = fixture.goal_store.get_phase("phs-1").await.expect("phase");
        let goal_before = fixture.goal_store.get_goal("goal-1").await.expect("goal");

        fixture
            .service
            .toggle_occurrence("occ-wed", true)
            .await
            .expect("second toggle");

        assert_eq!(
            fixture.goal_store.get_task("tsk-1").await.expect("task"),
            task_before
        );
        assert_eq!(
            fixture.goal_store.get_phase("phs-1").await.expect("phase"),
            phase_before
        );
        assert_eq!(
            fixture.goal_store.get_goal("goal-1").await.expect("goal"),
            goal_before
        );
    }

    #[tokio::test]
    async fn completing_everything_completes_the_cascade() {
        let fixture = fixture().await;
        fixture
            .service
            .toggle_occurrence("occ-mon", true)
            .await
            .expect("toggle monday");
        fixture
            .service
            .toggle_occurrence("occ-wed", true)
            .await
            .expect("toggle wednesday");

        let task = fixture.goal_store.get_task("tsk-1").await.expect("task");
        assert_eq!(task.time_spent, 180);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(fixed_now()));

        let phase = fixture.goal_store.get_phase("phs-1").await.expect("phase");
        assert_eq!(phase.status, PhaseStatus::Completed);
        assert!(phase.completed_at.is_some());

        let goal = fixture.goal_store.get_goal("goal-1").await.expect("goal");
        assert_eq!(goal.progress, 100);
        assert_eq!(goal.status, GoalStatus::Completed);
    }

    #[tokio::test]
    async fn untoggling_regresses_progress_but_keeps_phase_timestamps() {
        let fixture = fixture().await;
        fixture
            .service
            .toggle_occurrence("occ-mon", true)
            .await
            .expect("toggle on");
        fixture
            .service
            .toggle_occurrence("occ-wed", true)
            .await
            .expect("toggle wednesday on");
        fixture
            .service
            .toggle_occurrence("occ-mon", false)
            .await
            .expect("toggle monday off");
        fixture
            .service
            .toggle_occurrence("occ-wed", false)
            .await
            .expect("toggle wednesday off");

        let task = fixture.goal_store.get_task("tsk-1").await.expect("task");
        assert_eq!(task.time_spent, 0);
        assert_eq!(task.status, TaskStatus::Todo);

        let phase = fixture.goal_store.get_phase("phs-1").await.expect("phase");
        assert_eq!(phase.progress, 0);
        assert_eq!(phase.status, PhaseStatus::NotStarted);
        // Once stamped, the timestamps survive the regression.
        assert!(phase.started_at.is_some());
        assert!(phase.completed_at.is_some());

        let goal = fixture.goal_store.get_goal("goal-1").await.expect("goal");
        assert_eq!(goal.progress, 0);
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn task_without_phase_skips_the_phase_level() {
        let schedule_repo = Arc::new(InMemoryScheduleRepository::default());
        let goal_store = Arc::new(InMemoryGoalStore::default());
        goal_store
            .create_goal(&Goal {
                id: "goal-1".to_string(),
                user_id: "usr-1".to_string(),
                title: "Free-floating".to_string(),
                description: String::new(),
                status: GoalStatus::Active,
                estimated_time: 1,
                progress: 0,
                created_at: fixed_now(),
                updated_at: fixed_now(),
            })
            .await
            .expect("create goal");
        goal_store
            .create_task(&Task {
                id: "tsk-1".to_string(),
                goal_id: "goal-1".to_string(),
                phase_id: None,
                title: "Standalone".to_string(),
                description: String::new(),
                status: TaskStatus::Todo,
                estimated_time: 1,
                time_spent: 0,
                completed_at: None,
                created_at: fixed_now(),
                updated_at: fixed_now(),
            })
            .await
            .expect("create task");
        schedule_repo
            .insert_occurrences(&[occurrence("occ-1", "tsk-1", "2026-03-02", "09:00", "10:00")])
            .await
            .expect("insert");

        let service = ProgressService::new(schedule_repo, Arc::clone(&goal_store))
            .with_now_provider(Arc::new(fixed_now));
        service
            .toggle_occurrence("occ-1", true)
            .await
            .expect("toggle");

        let task = goal_store.get_task("tsk-1").await.expect("task");
        assert_eq!(task.status, TaskStatus::Completed);
        let goal = goal_store.get_goal("goal-1").await.expect("goal");
        assert_eq!(goal.status, GoalStatus::Completed);
    }

    #[tokio::test]
    async fn toggling_a_missing_occurrence_is_not_found() {
        let fixture = fixture().await;
        let result = fixture.service.toggle_occurrence("occ-missing", true).await;
        assert!(matches!(result, Err(PlannerError::NotFound { .. })));
    }
}
