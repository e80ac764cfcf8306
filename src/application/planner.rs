use crate::domain::models::{
    combine_date_time, next_id, weekday_index, Availability, Occurrence, OccurrenceStatus, Task,
    TaskStatus, TimeSlot,
};
use crate::domain::timerange::{merge_ranges, subtract_ranges, TimeRange};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeInterval {
    pub slot_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FreeInterval {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone)]
struct TaskDemand {
    task_id: String,
    remaining_minutes: i64,
}

/// Queue of tasks still needing placement, in the order the task list
/// returns them.
fn demands_from_tasks(tasks: &[Task]) -> Vec<TaskDemand> {
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Todo && task.estimated_minutes() > 0)
        .map(|task| TaskDemand {
            task_id: task.id.clone(),
            remaining_minutes: task.estimated_minutes(),
        })
        .collect()
}

/// Groups a goal's slots by weekday, each group sorted by start time.
pub fn slots_by_weekday(
    availability: &[Availability],
    slots: &[TimeSlot],
) -> HashMap<u8, Vec<TimeSlot>> {
    let weekday_of: HashMap<&str, u8> = availability
        .iter()
        .map(|entry| (entry.id.as_str(), entry.day_of_week))
        .collect();

    let mut grouped: HashMap<u8, Vec<TimeSlot>> = HashMap::new();
    for slot in slots {
        if let Some(&day) = weekday_of.get(slot.availability_id.as_str()) {
            grouped.entry(day).or_default().push(slot.clone());
        }
    }
    for day_slots in grouped.values_mut() {
        day_slots.sort_by_key(|slot| slot.start_time);
    }
    grouped
}

/// Free intervals of one day: every same-day occurrence is clipped against
/// each slot window, merged, and subtracted. Occurrences referencing slots
/// from a replaced availability generation still count as busy.
pub fn free_intervals_for_day(
    date: NaiveDate,
    slots: &[TimeSlot],
    occurrences: &[Occurrence],
) -> Vec<FreeInterval> {
    let mut result = Vec::new();
    for slot in slots {
        let window = TimeRange::new(
            combine_date_time(date, slot.start_time),
            combine_date_time(date, slot.end_time),
        );

        let mut busy = Vec::new();
        for occurrence in occurrences {
            if occurrence.date != date {
                continue;
            }
            let clipped = TimeRange::new(
                occurrence.start_at.max(window.start),
                occurrence.end_at.min(window.end),
            );
            if !clipped.is_empty() {
                busy.push(clipped);
            }
        }

        let merged = merge_ranges(busy);
        for free in subtract_ranges(window, &merged) {
            if free.duration_minutes() > 0 {
                result.push(FreeInterval {
                    slot_id: slot.id.clone(),
                    start: free.start,
                    end: free.end,
                });
            }
        }
    }
    result
}

/// Greedy first-fit packing over the day horizon. Walks days forward,
/// consumes free intervals in order, and fills the task queue's remaining
/// minutes; stops as soon as every demand reaches zero. Returns the planned
/// occurrence batch; nothing is persisted here.
pub fn pack_horizon(
    today: NaiveDate,
    horizon_days: u32,
    slots_by_day: &HashMap<u8, Vec<TimeSlot>>,
    existing: &[Occurrence],
    tasks: &[Task],
    now: DateTime<Utc>,
) -> Vec<Occurrence> {
    let mut demands = demands_from_tasks(tasks);
    if demands.is_empty() || slots_by_day.is_empty() {
        return Vec::new();
    }
    debug!(
        tasks = demands.len(),
        horizon_days, "collected tasks to schedule"
    );

    let mut placed = Vec::new();
    'horizon: for day_offset in 0..horizon_days {
        let date = today + Duration::days(i64::from(day_offset));
        let Some(day_slots) = slots_by_day.get(&weekday_index(date)) else {
            continue;
        };

        let mut intervals = free_intervals_for_day(date, day_slots, existing);
        debug!(%date, intervals = intervals.len(), "computed free intervals");

        for interval_index in 0..intervals.len() {
            for demand_index in 0..demands.len() {
                if demands[demand_index].remaining_minutes <= 0 {
                    continue;
                }
                let available = intervals[interval_index].duration_minutes();
                if available <= 0 {
                    break;
                }

                let consumed = demands[demand_index].remaining_minutes.min(available);
                let start = intervals[interval_index].start;
                let end = start + Duration::minutes(consumed);
                placed.push(Occurrence {
                    id: next_id("occ"),
                    task_id: demands[demand_index].task_id.clone(),
                    time_slot_id: intervals[interval_index].slot_id.clone(),
                    date,
                    start_at: start,
                    end_at: end,
                    status: OccurrenceStatus::Scheduled,
                    created_at: now,
                    updated_at: now,
                });
                demands[demand_index].remaining_minutes -= consumed;
                intervals[interval_index].start = end;

                if demands.iter().all(|demand| demand.remaining_minutes <= 0) {
                    break 'horizon;
                }
            }
        }
    }

    debug!(placed = placed.len(), "horizon packing finished");
    placed
}
