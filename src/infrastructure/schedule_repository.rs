use crate::domain::models::{Availability, Occurrence, OccurrenceStatus, TimeSlot};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::row_helpers::{
    parse_date, parse_time, parse_timestamp, placeholders,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCount {
    pub completed: i64,
    pub total: i64,
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Wholesale availability replacement for a goal, plus the occurrence
    /// batch produced by the follow-up scheduling run, in one transaction.
    async fn replace_availability(
        &self,
        goal_id: &str,
        availability: &[Availability],
        slots: &[TimeSlot],
        occurrences: &[Occurrence],
    ) -> Result<(), PlannerError>;

    async fn list_availability_by_goal(
        &self,
        goal_id: &str,
    ) -> Result<Vec<Availability>, PlannerError>;

    async fn list_time_slots(
        &self,
        availability_ids: &[String],
    ) -> Result<Vec<TimeSlot>, PlannerError>;

    /// Persists a scheduling run's batch; all inserts commit or none do.
    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<(), PlannerError>;

    async fn delete_occurrences_for_tasks(&self, task_ids: &[String]) -> Result<(), PlannerError>;

    async fn list_occurrences_for_tasks_in_range(
        &self,
        task_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError>;

    async fn list_occurrences_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError>;

    async fn list_upcoming_occurrences(
        &self,
        from: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Occurrence>, PlannerError>;

    async fn count_occurrences_by_day(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<NaiveDate, DayCount>, PlannerError>;

    async fn get_occurrence(&self, id: &str) -> Result<Occurrence, PlannerError>;

    async fn update_occurrence_status(
        &self,
        id: &str,
        status: OccurrenceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError>;

    async fn sum_completed_minutes_for_task(&self, task_id: &str) -> Result<i64, PlannerError>;
}

#[derive(Debug, Clone)]
pub struct SqliteScheduleRepository {
    db_path: PathBuf,
}

impl SqliteScheduleRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, PlannerError> {
        Connection::open(&self.db_path).map_err(PlannerError::from)
    }
}

const OCCURRENCE_COLUMNS: &str =
    "id, task_id, time_slot_id, scheduled_date, start_at, end_at, status, created_at, updated_at";

type OccurrenceRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn occurrence_from_row(row: OccurrenceRow) -> Result<Occurrence, PlannerError> {
    let (id, task_id, time_slot_id, date, start_at, end_at, status, created_at, updated_at) = row;
    let status = OccurrenceStatus::parse(&status)
        .ok_or_else(|| PlannerError::Internal(format!("invalid occurrence.status '{status}'")))?;
    Ok(Occurrence {
        date: parse_date(&date, "occurrence.scheduled_date")?,
        start_at: parse_timestamp(&start_at, "occurrence.start_at")?,
        end_at: parse_timestamp(&end_at, "occurrence.end_at")?,
        created_at: parse_timestamp(&created_at, "occurrence.created_at")?,
        updated_at: parse_timestamp(&updated_at, "occurrence.updated_at")?,
        id,
        task_id,
        time_slot_id,
        status,
    })
}

fn query_occurrences(
    connection: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Occurrence>, PlannerError> {
    let mut statement = connection.prepare(sql)?;
    let rows = statement.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(occurrence_from_row(row?)?);
    }
    Ok(result)
}

fn insert_occurrence_tx(
    transaction: &rusqlite::Transaction<'_>,
    occurrence: &Occurrence,
) -> Result<(), PlannerError> {
    transaction.execute(
        "INSERT INTO occurrence (id, task_id, time_slot_id, scheduled_date, start_at, end_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            occurrence.id,
            occurrence.task_id,
            occurrence.time_slot_id,
            occurrence.date.format("%Y-%m-%d").to_string(),
            occurrence.start_at.to_rfc3339(),
            occurrence.end_at.to_rfc3339(),
            occurrence.status.as_str(),
            occurrence.created_at.to_rfc3339(),
            occurrence.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn replace_availability(
        &self,
        goal_id: &str,
        availability: &[Availability],
        slots: &[TimeSlot],
        occurrences: &[Occurrence],
    ) -> Result<(), PlannerError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;

        transaction.execute(
            "DELETE FROM time_slot
             WHERE availability_id IN (SELECT id FROM availability WHERE goal_id = ?1)",
            params![goal_id],
        )?;
        transaction.execute(
            "DELETE FROM availability WHERE goal_id = ?1",
            params![goal_id],
        )?;

        for entry in availability {
            transaction.execute(
                "INSERT INTO availability (id, goal_id, day_of_week, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id,
                    entry.goal_id,
                    entry.day_of_week,
                    entry.created_at.to_rfc3339(),
                    entry.updated_at.to_rfc3339(),
                ],
            )?;
        }
        for slot in slots {
            transaction.execute(
                "INSERT INTO time_slot (id, availability_id, start_time, end_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    slot.id,
                    slot.availability_id,
                    slot.start_time.format("%H:%M").to_string(),
                    slot.end_time.format("%H:%M").to_string(),
                    slot.created_at.to_rfc3339(),
                    slot.updated_at.to_rfc3339(),
                ],
            )?;
        }
        for occurrence in occurrences {
            insert_occurrence_tx(&transaction, occurrence)?;
        }

        transaction.commit()?;
        Ok(())
    }

    async fn list_availability_by_goal(
        &self,
        goal_id: &str,
    ) -> Result<Vec<Availability>, PlannerError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, goal_id, day_of_week, created_at, updated_at
             FROM availability WHERE goal_id = ?1 ORDER BY day_of_week ASC",
        )?;
        let rows = statement.query_map(params![goal_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, goal_id, day_of_week, created_at, updated_at) = row?;
            result.push(Availability {
                day_of_week: u8::try_from(day_of_week).map_err(|_| {
                    PlannerError::Internal(format!("invalid day_of_week {day_of_week}"))
                })?,
                created_at: parse_timestamp(&created_at, "availability.created_at")?,
                updated_at: parse_timestamp(&updated_at, "availability.updated_at")?,
                id,
                goal_id,
            });
        }
        Ok(result)
    }

    async fn list_time_slots(
        &self,
        availability_ids: &[String],
    ) -> Result<Vec<TimeSlot>, PlannerError> {
        if availability_ids.is_empty() {
            return Ok(Vec::new());
        }
        let connection = self.connect()?;
        let sql = format!(
            "SELECT id, availability_id, start_time, end_time, created_at, updated_at
             FROM time_slot WHERE availability_id IN ({}) ORDER BY start_time",
            placeholders(availability_ids.len())
        );
        let mut statement = connection.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = availability_ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, availability_id, start_time, end_time, created_at, updated_at) = row?;
            result.push(TimeSlot {
                start_time: parse_time(&start_time, "time_slot.start_time")?,
                end_time: parse_time(&end_time, "time_slot.end_time")?,
                created_at: parse_timestamp(&created_at, "time_slot.created_at")?,
                updated_at: parse_timestamp(&updated_at, "time_slot.updated_at")?,
                id,
                availability_id,
            });
        }
        Ok(result)
    }

    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<(), PlannerError> {
        if occurrences.is_empty() {
            return Ok(());
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for occurrence in occurrences {
            insert_occurrence_tx(&transaction, occurrence)?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn delete_occurrences_for_tasks(&self, task_ids: &[String]) -> Result<(), PlannerError> {
        if task_ids.is_empty() {
            return Ok(());
        }
        let connection = self.connect()?;
        let sql = format!(
            "DELETE FROM occurrence WHERE task_id IN ({})",
            placeholders(task_ids.len())
        );
        let params: Vec<&dyn rusqlite::types::ToSql> = task_ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();
        connection.execute(&sql, params.as_slice())?;
        Ok(())
    }

    async fn list_occurrences_for_tasks_in_range(
        &self,
        task_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrence
             WHERE scheduled_date >= ?1 AND scheduled_date <= ?2 AND task_id IN ({})
             ORDER BY scheduled_date, start_at",
            placeholders_offset(task_ids.len(), 2)
        );
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&start, &end];
        params.extend(task_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));
        query_occurrences(&connection, &sql, params.as_slice())
    }

    async fn list_occurrences_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrence
             WHERE scheduled_date >= ?1 AND scheduled_date <= ?2
             ORDER BY scheduled_date, start_at"
        );
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        query_occurrences(&connection, &sql, &[&start, &end])
    }

    async fn list_upcoming_occurrences(
        &self,
        from: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrence
             WHERE scheduled_date >= ?1
             ORDER BY scheduled_date, start_at
             LIMIT ?2"
        );
        let from = from.format("%Y-%m-%d").to_string();
        let limit = limit as i64;
        query_occurrences(&connection, &sql, &[&from, &limit])
    }

    async fn count_occurrences_by_day(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<NaiveDate, DayCount>, PlannerError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT scheduled_date,
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
                    COUNT(*) AS total
             FROM occurrence
             WHERE scheduled_date >= ?1 AND scheduled_date <= ?2
             GROUP BY scheduled_date",
        )?;
        let rows = statement.query_map(
            params![
                start.format("%Y-%m-%d").to_string(),
                end.format("%Y-%m-%d").to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut result = HashMap::new();
        for row in rows {
            let (date, completed, total) = row?;
            result.insert(
                parse_date(&date, "occurrence.scheduled_date")?,
                DayCount { completed, total },
            );
        }
        Ok(result)
    }

    async fn get_occurrence(&self, id: &str) -> Result<Occurrence, PlannerError> {
        let connection = self.connect()?;
        let sql = format!("SELECT {OCCURRENCE_COLUMNS} FROM occurrence WHERE id = ?1");
        let row = connection
            .query_row(&sql, params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .optional()?;

        let Some(row) = row else {
            return Err(PlannerError::not_found("occurrence", id));
        };
        occurrence_from_row(row)
    }

    async fn update_occurrence_status(
        &self,
        id: &str,
        status: OccurrenceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE occurrence SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(PlannerError::not_found("occurrence", id));
        }
        Ok(())
    }

    async fn sum_completed_minutes_for_task(&self, task_id: &str) -> Result<i64, PlannerError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrence
             WHERE task_id = ?1 AND status = 'completed'"
        );
        let occurrences = query_occurrences(&connection, &sql, &[&task_id])?;
        Ok(occurrences
            .iter()
            .map(Occurrence::duration_minutes)
            .sum())
    }
}

/// Placeholders continuing after `offset` already-used positions.
fn placeholders_offset(count: usize, offset: usize) -> String {
    (1..=count)
        .map(|index| format!("?{}", index + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default)]
struct ScheduleState {
    availability: Vec<Availability>,
    slots: Vec<TimeSlot>,
    occurrences: Vec<Occurrence>,
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleRepository {
    state: Mutex<ScheduleState>,
}

impl InMemoryScheduleRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ScheduleState>, PlannerError> {
        self.state
            .lock()
            .map_err(|error| PlannerError::Internal(format!("schedule state lock poisoned: {error}")))
    }
}

fn sort_by_date_and_start(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(|a, b| a.date.cmp(&b.date).then(a.start_at.cmp(&b.start_at)));
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn replace_availability(
        &self,
        goal_id: &str,
        availability: &[Availability],
        slots: &[TimeSlot],
        occurrences: &[Occurrence],
    ) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        let removed: Vec<String> = state
            .availability
            .iter()
            .filter(|entry| entry.goal_id == goal_id)
            .map(|entry| entry.id.clone())
            .collect();
        state
            .slots
            .retain(|slot| !removed.contains(&slot.availability_id));
        state.availability.retain(|entry| entry.goal_id != goal_id);
        state.availability.extend_from_slice(availability);
        state.slots.extend_from_slice(slots);
        state.occurrences.extend_from_slice(occurrences);
        Ok(())
    }

    async fn list_availability_by_goal(
        &self,
        goal_id: &str,
    ) -> Result<Vec<Availability>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<Availability> = state
            .availability
            .iter()
            .filter(|entry| entry.goal_id == goal_id)
            .cloned()
            .collect();
        result.sort_by_key(|entry| entry.day_of_week);
        Ok(result)
    }

    async fn list_time_slots(
        &self,
        availability_ids: &[String],
    ) -> Result<Vec<TimeSlot>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<TimeSlot> = state
            .slots
            .iter()
            .filter(|slot| availability_ids.contains(&slot.availability_id))
            .cloned()
            .collect();
        result.sort_by_key(|slot| slot.start_time);
        Ok(result)
    }

    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        state.occurrences.extend_from_slice(occurrences);
        Ok(())
    }

    async fn delete_occurrences_for_tasks(&self, task_ids: &[String]) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        state
            .occurrences
            .retain(|occurrence| !task_ids.contains(&occurrence.task_id));
        Ok(())
    }

    async fn list_occurrences_for_tasks_in_range(
        &self,
        task_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<Occurrence> = state
            .occurrences
            .iter()
            .filter(|occurrence| {
                task_ids.contains(&occurrence.task_id)
                    && occurrence.date >= start
                    && occurrence.date <= end
            })
            .cloned()
            .collect();
        sort_by_date_and_start(&mut result);
        Ok(result)
    }

    async fn list_occurrences_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<Occurrence> = state
            .occurrences
            .iter()
            .filter(|occurrence| occurrence.date >= start && occurrence.date <= end)
            .cloned()
            .collect();
        sort_by_date_and_start(&mut result);
        Ok(result)
    }

    async fn list_upcoming_occurrences(
        &self,
        from: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Occurrence>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<Occurrence> = state
            .occurrences
            .iter()
            .filter(|occurrence| occurrence.date >= from)
            .cloned()
            .collect();
        sort_by_date_and_start(&mut result);
        result.truncate(limit);
        Ok(result)
    }

    async fn count_occurrences_by_day(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<NaiveDate, DayCount>, PlannerError> {
        let state = self.lock()?;
        let mut result: HashMap<NaiveDate, DayCount> = HashMap::new();
        for occurrence in &state.occurrences {
            if occurrence.date < start || occurrence.date > end {
                continue;
            }
            let entry = result.entry(occurrence.date).or_default();
            entry.total += 1;
            if occurrence.status == OccurrenceStatus::Completed {
                entry.completed += 1;
            }
        }
        Ok(result)
    }

    async fn get_occurrence(&self, id: &str) -> Result<Occurrence, PlannerError> {
        let state = self.lock()?;
        state
            .occurrences
            .iter()
            .find(|occurrence| occurrence.id == id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("occurrence", id))
    }

    async fn update_occurrence_status(
        &self,
        id: &str,
        status: OccurrenceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        let occurrence = state
            .occurrences
            .iter_mut()
            .find(|occurrence| occurrence.id == id)
            .ok_or_else(|| PlannerError::not_found("occurrence", id))?;
        occurrence.status = status;
        occurrence.updated_at = now;
        Ok(())
    }

    async fn sum_completed_minutes_for_task(&self, task_id: &str) -> Result<i64, PlannerError> {
        let state = self.lock()?;
        Ok(state
            .occurrences
            .iter()
            .filter(|occurrence| {
                occurrence.task_id == task_id && occurrence.status == OccurrenceStatus::Completed
            })
            .map(Occurrence::duration_minutes)
            .sum())
    }
}
