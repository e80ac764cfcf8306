use crate::application::planner::{pack_horizon, slots_by_weekday};
use crate::domain::models::{
    next_id, parse_hhmm, Availability, GoalStatus, Occurrence, TimeSlot,
};
use crate::infrastructure::config::DEFAULT_HORIZON_DAYS;
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::goal_repository::GoalStore;
use crate::infrastructure::schedule_repository::ScheduleRepository;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotInput {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayAvailability {
    pub day_of_week: u8,
    pub slots: Vec<SlotInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyAvailability {
    pub days: Vec<DayAvailability>,
}

fn parse_slot_times(start: &str, end: &str) -> Result<(NaiveTime, NaiveTime), PlannerError> {
    let (Some(start_time), Some(end_time)) = (parse_hhmm(start), parse_hhmm(end)) else {
        return Err(PlannerError::Validation(format!(
            "invalid slot time: {start} - {end}"
        )));
    };
    if start_time >= end_time {
        return Err(PlannerError::Validation(format!(
            "start_time >= end_time: {start} - {end}"
        )));
    }
    Ok((start_time, end_time))
}

fn validate_day_slots(slots: &[(NaiveTime, NaiveTime)]) -> Result<(), PlannerError> {
    if slots.len() <= 1 {
        return Ok(());
    }
    let mut sorted = slots.to_vec();
    sorted.sort_by_key(|&(start, _)| start);
    for pair in sorted.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(PlannerError::Validation("time slots overlap".to_string()));
        }
    }
    Ok(())
}

/// Full input validation; nothing is written unless every day passes.
fn parse_weekly_availability(
    input: &WeeklyAvailability,
) -> Result<Vec<(u8, Vec<(NaiveTime, NaiveTime)>)>, PlannerError> {
    let mut parsed = Vec::new();
    for day in &input.days {
        if day.day_of_week > 6 {
            return Err(PlannerError::Validation(format!(
                "invalid day_of_week: {}",
                day.day_of_week
            )));
        }
        let mut slots = Vec::new();
        for slot in &day.slots {
            slots.push(parse_slot_times(&slot.start_time, &slot.end_time)?);
        }
        validate_day_slots(&slots)?;
        parsed.push((day.day_of_week, slots));
    }
    Ok(parsed)
}

pub struct ScheduleService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    schedule_repo: Arc<S>,
    goal_store: Arc<G>,
    horizon_days: u32,
    now_provider: NowProvider,
}

impl<S, G> ScheduleService<S, G>
where
    S: ScheduleRepository,
    G: GoalStore,
{
    pub fn new(schedule_repo: Arc<S>, goal_store: Arc<G>) -> Self {
        Self {
            schedule_repo,
            goal_store,
            horizon_days: DEFAULT_HORIZON_DAYS,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_horizon_days(mut self, horizon_days: u32) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Replaces a goal's weekly availability wholesale and reschedules its
    /// pending tasks. The delete, the inserts and the new occurrence batch
    /// commit in one transaction; validation failures leave prior state
    /// untouched. Returns the number of occurrences created.
    pub async fn replace_availability(
        &self,
        goal_id: &str,
        input: &WeeklyAvailability,
    ) -> Result<usize, PlannerError> {
        let parsed = parse_weekly_availability(input)?;
        let now = (self.now_provider)();

        let mut availability = Vec::new();
        let mut slots = Vec::new();
        for (day_of_week, day_slots) in parsed {
            let entry = Availability {
                id: next_id("av"),
                goal_id: goal_id.to_string(),
                day_of_week,
                created_at: now,
                updated_at: now,
            };
            for (start_time, end_time) in day_slots {
                slots.push(TimeSlot {
                    id: next_id("slot"),
                    availability_id: entry.id.clone(),
                    start_time,
                    end_time,
                    created_at: now,
                    updated_at: now,
                });
            }
            availability.push(entry);
        }

        let planned = self.plan_for_goal(goal_id, &availability, &slots, now).await?;
        self.schedule_repo
            .replace_availability(goal_id, &availability, &slots, &planned)
            .await?;
        self.activate_goal_if_planning(goal_id, planned.len(), now)
            .await?;

        info!(
            goal_id,
            days = availability.len(),
            scheduled = planned.len(),
            "availability replaced"
        );
        Ok(planned.len())
    }

    /// Current availability in the same shape the update takes.
    pub async fn list_availability(
        &self,
        goal_id: &str,
    ) -> Result<WeeklyAvailability, PlannerError> {
        let availability = self.schedule_repo.list_availability_by_goal(goal_id).await?;
        let ids: Vec<String> = availability.iter().map(|entry| entry.id.clone()).collect();
        let slots = self.schedule_repo.list_time_slots(&ids).await?;

        let days = availability
            .iter()
            .map(|entry| DayAvailability {
                day_of_week: entry.day_of_week,
                slots: slots
                    .iter()
                    .filter(|slot| slot.availability_id == entry.id)
                    .map(|slot| SlotInput {
                        start_time: slot.start_time.format("%H:%M").to_string(),
                        end_time: slot.end_time.format("%H:%M").to_string(),
                    })
                    .collect(),
            })
            .collect();
        Ok(WeeklyAvailability { days })
    }

    /// Schedules the goal's pending tasks against its current availability.
    /// Prior occurrences are never deleted; clear them first via
    /// `clear_schedule` to regenerate from scratch.
    pub async fn reschedule(&self, goal_id: &str) -> Result<usize, PlannerError> {
        let now = (self.now_provider)();
        let availability = self.schedule_repo.list_availability_by_goal(goal_id).await?;
        let ids: Vec<String> = availability.iter().map(|entry| entry.id.clone()).collect();
        let slots = self.schedule_repo.list_time_slots(&ids).await?;

        let planned = self.plan_for_goal(goal_id, &availability, &slots, now).await?;
        self.schedule_repo.insert_occurrences(&planned).await?;
        self.activate_goal_if_planning(goal_id, planned.len(), now)
            .await?;

        info!(goal_id, scheduled = planned.len(), "reschedule finished");
        Ok(planned.len())
    }

    /// Deletes every occurrence of the goal's tasks. The one way to
    /// reschedule from scratch.
    pub async fn clear_schedule(&self, goal_id: &str) -> Result<(), PlannerError> {
        let tasks = self.goal_store.list_tasks_by_goal(goal_id).await?;
        let task_ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        self.schedule_repo
            .delete_occurrences_for_tasks(&task_ids)
            .await?;
        info!(goal_id, "schedule cleared");
        Ok(())
    }

    async fn plan_for_goal(
        &self,
        goal_id: &str,
        availability: &[Availability],
        slots: &[TimeSlot],
        now: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let tasks = self.goal_store.list_tasks_by_goal(goal_id).await?;
        debug!(goal_id, tasks = tasks.len(), "loaded task list");

        let grouped = slots_by_weekday(availability, slots);
        if grouped.is_empty() {
            return Ok(Vec::new());
        }

        let today = now.date_naive();
        let horizon_end = today + Duration::days(i64::from(self.horizon_days) - 1);
        let task_ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        let existing = self
            .schedule_repo
            .list_occurrences_for_tasks_in_range(&task_ids, today, horizon_end)
            .await?;

        Ok(pack_horizon(
            today,
            self.horizon_days,
            &grouped,
            &existing,
            &tasks,
            now,
        ))
    }

    async fn activate_goal_if_planning(
        &self,
        goal_id: &str,
        scheduled: usize,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        if scheduled == 0 {
            return Ok(());
        }
        let mut goal = self.goal_store.get_goal(goal_id).await?;
        if goal.status == GoalStatus::Planning {
            goal.status = GoalStatus::Active;
            goal.updated_at = now;
            self.goal_store.update_goal(&goal).await?;
            info!(goal_id, "goal activated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{combine_date_time, Goal, Task, TaskStatus};
    use crate::infrastructure::goal_repository::InMemoryGoalStore;
    use crate::infrastructure::schedule_repository::InMemoryScheduleRepository;
    use chrono::NaiveDate;

    fn fixed_now() -> DateTime<Utc> {
        // Midnight before Monday 2026-03-02.
        DateTime::parse_from_rfc3339("2026-03-02T00:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn sample_goal(id: &str) -> Goal {
        Goal {
            id: id.to_string(),
            user_id: "usr-1".to_string(),
            title: "Learn Rust".to_string(),
            description: String::new(),
            status: GoalStatus::Planning,
            estimated_time: 10,
            progress: 0,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    fn sample_task(id: &str, goal_id: &str, estimated_hours: i64) -> Task {
        Task {
            id: id.to_string(),
            goal_id: goal_id.to_string(),
            phase_id: None,
            title: format!("task {id}"),
            description: String::new(),
            status: TaskStatus::Todo,
            estimated_time: estimated_hours,
            time_spent: 0,
            completed_at: None,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    fn monday_wednesday_input() -> WeeklyAvailability {
        WeeklyAvailability {
            days: vec![
                DayAvailability {
                    day_of_week: 1,
                    slots: vec![SlotInput {
                        start_time: "09:00".to_string(),
                        end_time: "10:00".to_string(),
                    }],
                },
                DayAvailability {
                    day_of_week: 3,
                    slots: vec![SlotInput {
                        start_time: "09:00".to_string(),
                        end_time: "11:00".to_string(),
                    }],
                },
            ],
        }
    }

    async fn service_with_goal() -> (
        ScheduleService<InMemoryScheduleRepository, InMemoryGoalStore>,
        Arc<InMemoryScheduleRepository>,
        Arc<InMemoryGoalStore>,
    ) {
        let schedule_repo = Arc::new(InMemoryScheduleRepository::default());
        let goal_store = Arc::new(InMemoryGoalStore::default());
        goal_store
            .create_goal(&sample_goal("goal-1"))
            .await
            .expect("create goal");
        let service = ScheduleService::new(Arc::clone(&schedule_repo), Arc::clone(&goal_store))
            .with_now_provider(Arc::new(fixed_now));
        (service, schedule_repo, goal_store)
    }

    #[tokio::test]
    async fn replace_availability_schedules_pending_tasks() {
        let (service, schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 3))
            .await
            .expect("create task");

        let scheduled = service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");
        assert_eq!(scheduled, 2);

        let occurrences = schedule_repo
            .list_occurrences_in_range(date("2026-03-01"), date("2026-03-31"))
            .await
            .expect("list occurrences");
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].date, date("2026-03-02"));
        assert_eq!(occurrences[0].duration_minutes(), 60);
        assert_eq!(occurrences[1].date, date("2026-03-04"));
        assert_eq!(occurrences[1].duration_minutes(), 120);

        let goal = goal_store.get_goal("goal-1").await.expect("get goal");
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let (service, _schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 3))
            .await
            .expect("create task");
        service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("seed availability");

        for bad in [
            WeeklyAvailability {
                days: vec![DayAvailability {
                    day_of_week: 7,
                    slots: vec![],
                }],
            },
            WeeklyAvailability {
                days: vec![DayAvailability {
                    day_of_week: 1,
                    slots: vec![SlotInput {
                        start_time: "10:00".to_string(),
                        end_time: "09:00".to_string(),
                    }],
                }],
            },
            WeeklyAvailability {
                days: vec![DayAvailability {
                    day_of_week: 1,
                    slots: vec![SlotInput {
                        start_time: "nine".to_string(),
                        end_time: "10:00".to_string(),
                    }],
                }],
            },
            WeeklyAvailability {
                days: vec![DayAvailability {
                    day_of_week: 1,
                    slots: vec![
                        SlotInput {
                            start_time: "09:00".to_string(),
                            end_time: "10:00".to_string(),
                        },
                        SlotInput {
                            start_time: "09:30".to_string(),
                            end_time: "11:00".to_string(),
                        },
                    ],
                }],
            },
        ] {
            let result = service.replace_availability("goal-1", &bad).await;
            assert!(matches!(result, Err(PlannerError::Validation(_))));
        }

        // The seeded availability survives every rejected update.
        let current = service
            .list_availability("goal-1")
            .await
            .expect("list availability");
        assert_eq!(current, monday_wednesday_input());
    }

    #[tokio::test]
    async fn empty_conditions_schedule_nothing_without_error() {
        let (service, _schedule_repo, goal_store) = service_with_goal().await;

        // No tasks at all.
        let scheduled = service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");
        assert_eq!(scheduled, 0);
        let goal = goal_store.get_goal("goal-1").await.expect("get goal");
        assert_eq!(goal.status, GoalStatus::Planning);

        // A task exists but no availability is configured.
        let (service, _schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 3))
            .await
            .expect("create task");
        assert_eq!(service.reschedule("goal-1").await.expect("reschedule"), 0);

        // Only non-todo tasks.
        let (service, _schedule_repo, goal_store) = service_with_goal().await;
        let mut done = sample_task("tsk-2", "goal-1", 2);
        done.status = TaskStatus::Completed;
        goal_store.create_task(&done).await.expect("create task");
        let scheduled = service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");
        assert_eq!(scheduled, 0);
    }

    #[tokio::test]
    async fn rerun_packs_remaining_free_capacity_without_deleting() {
        let (service, schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 3))
            .await
            .expect("create task");

        let first = service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("first run");
        assert_eq!(first, 2);

        // The task is still `todo`; a re-run fills the next week's windows
        // while leaving the original occurrences in place.
        let second = service.reschedule("goal-1").await.expect("second run");
        assert_eq!(second, 2);
        let occurrences = schedule_repo
            .list_occurrences_in_range(date("2026-03-01"), date("2026-03-31"))
            .await
            .expect("list occurrences");
        assert_eq!(occurrences.len(), 4);
        assert_eq!(occurrences[2].date, date("2026-03-09"));

        // Clearing first makes the next run reproduce the original placement.
        service.clear_schedule("goal-1").await.expect("clear");
        let third = service.reschedule("goal-1").await.expect("third run");
        assert_eq!(third, 2);
        let occurrences = schedule_repo
            .list_occurrences_in_range(date("2026-03-01"), date("2026-03-31"))
            .await
            .expect("list occurrences");
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].date, date("2026-03-02"));
    }

    #[tokio::test]
    async fn horizon_is_an_explicit_bound() {
        let (service, _schedule_repo, goal_store) = service_with_goal().await;
        let service = service.with_horizon_days(2);
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 3))
            .await
            .expect("create task");

        // Two-day horizon from Monday only reaches the Monday slot.
        let scheduled = service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");
        assert_eq!(scheduled, 1);
    }

    #[tokio::test]
    async fn list_availability_round_trips_input_shape() {
        let (service, _schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 1))
            .await
            .expect("create task");

        service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");
        let listed = service
            .list_availability("goal-1")
            .await
            .expect("list availability");
        assert_eq!(listed, monday_wednesday_input());
    }

    #[tokio::test]
    async fn occurrences_stay_inside_their_slot_windows() {
        let (service, schedule_repo, goal_store) = service_with_goal().await;
        goal_store
            .create_task(&sample_task("tsk-1", "goal-1", 5))
            .await
            .expect("create task");
        service
            .replace_availability("goal-1", &monday_wednesday_input())
            .await
            .expect("replace availability");

        let occurrences = schedule_repo
            .list_occurrences_in_range(date("2026-03-01"), date("2026-03-31"))
            .await
            .expect("list occurrences");
        for occurrence in &occurrences {
            let window_start = combine_date_time(
                occurrence.date,
                parse_hhmm("09:00").expect("time"),
            );
            let window_end =
                combine_date_time(occurrence.date, parse_hhmm("11:00").expect("time"));
            assert!(occurrence.start_at >= window_start);
            assert!(occurrence.end_at <= window_end);
        }
    }
}
