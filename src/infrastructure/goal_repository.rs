use crate::domain::models::{Goal, GoalStatus, Phase, PhaseStatus, Task, TaskStatus};
use crate::infrastructure::error::PlannerError;
use crate::infrastructure::row_helpers::{parse_opt_timestamp, parse_timestamp, placeholders};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The goal/phase/task collaborator the scheduling engine reads from and the
/// progress cascade writes back to.
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn create_goal(&self, goal: &Goal) -> Result<(), PlannerError>;
    async fn get_goal(&self, id: &str) -> Result<Goal, PlannerError>;
    async fn update_goal(&self, goal: &Goal) -> Result<(), PlannerError>;
    async fn get_goals_by_ids(&self, ids: &[String]) -> Result<Vec<Goal>, PlannerError>;

    async fn create_phase(&self, phase: &Phase) -> Result<(), PlannerError>;
    async fn get_phase(&self, id: &str) -> Result<Phase, PlannerError>;
    async fn update_phase(&self, phase: &Phase) -> Result<(), PlannerError>;
    async fn list_phases_by_goal(&self, goal_id: &str) -> Result<Vec<Phase>, PlannerError>;

    async fn create_task(&self, task: &Task) -> Result<(), PlannerError>;
    async fn get_task(&self, id: &str) -> Result<Task, PlannerError>;
    async fn update_task(&self, task: &Task) -> Result<(), PlannerError>;
    /// Stable creation order; the scheduler's queue order comes from here.
    async fn list_tasks_by_goal(&self, goal_id: &str) -> Result<Vec<Task>, PlannerError>;
    async fn get_tasks_by_ids(&self, ids: &[String]) -> Result<Vec<Task>, PlannerError>;
}

#[derive(Debug, Clone)]
pub struct SqliteGoalStore {
    db_path: PathBuf,
}

impl SqliteGoalStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, PlannerError> {
        Connection::open(&self.db_path).map_err(PlannerError::from)
    }
}

const GOAL_COLUMNS: &str =
    "id, user_id, title, description, status, estimated_time, progress, created_at, updated_at";
const PHASE_COLUMNS: &str = "id, goal_id, title, description, status, estimated_time, progress, \
                             position, started_at, completed_at, created_at, updated_at";
const TASK_COLUMNS: &str = "id, goal_id, phase_id, title, description, status, estimated_time, \
                            time_spent, completed_at, created_at, updated_at";

type GoalRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    String,
    String,
);

fn goal_from_row(row: GoalRow) -> Result<Goal, PlannerError> {
    let (id, user_id, title, description, status, estimated_time, progress, created_at, updated_at) =
        row;
    let status = GoalStatus::parse(&status)
        .ok_or_else(|| PlannerError::Internal(format!("invalid goal.status '{status}'")))?;
    Ok(Goal {
        created_at: parse_timestamp(&created_at, "goal.created_at")?,
        updated_at: parse_timestamp(&updated_at, "goal.updated_at")?,
        id,
        user_id,
        title,
        description,
        status,
        estimated_time,
        progress,
    })
}

type PhaseRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn phase_from_row(row: PhaseRow) -> Result<Phase, PlannerError> {
    let (
        id,
        goal_id,
        title,
        description,
        status,
        estimated_time,
        progress,
        position,
        started_at,
        completed_at,
        created_at,
        updated_at,
    ) = row;
    let status = PhaseStatus::parse(&status)
        .ok_or_else(|| PlannerError::Internal(format!("invalid phase.status '{status}'")))?;
    Ok(Phase {
        started_at: parse_opt_timestamp(started_at.as_deref(), "phase.started_at")?,
        completed_at: parse_opt_timestamp(completed_at.as_deref(), "phase.completed_at")?,
        created_at: parse_timestamp(&created_at, "phase.created_at")?,
        updated_at: parse_timestamp(&updated_at, "phase.updated_at")?,
        id,
        goal_id,
        title,
        description,
        status,
        estimated_time,
        progress,
        position,
    })
}

type TaskRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    String,
    String,
);

fn task_from_row(row: TaskRow) -> Result<Task, PlannerError> {
    let (
        id,
        goal_id,
        phase_id,
        title,
        description,
        status,
        estimated_time,
        time_spent,
        completed_at,
        created_at,
        updated_at,
    ) = row;
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| PlannerError::Internal(format!("invalid task.status '{status}'")))?;
    Ok(Task {
        completed_at: parse_opt_timestamp(completed_at.as_deref(), "task.completed_at")?,
        created_at: parse_timestamp(&created_at, "task.created_at")?,
        updated_at: parse_timestamp(&updated_at, "task.updated_at")?,
        id,
        goal_id,
        phase_id,
        title,
        description,
        status,
        estimated_time,
        time_spent,
    })
}

fn query_tasks(
    connection: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Task>, PlannerError> {
    let mut statement = connection.prepare(sql)?;
    let rows = statement.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, i64>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, String>(10)?,
        ))
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(task_from_row(row?)?);
    }
    Ok(result)
}

#[async_trait]
impl GoalStore for SqliteGoalStore {
    async fn create_goal(&self, goal: &Goal) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO goals (id, user_id, title, description, status, estimated_time, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                goal.id,
                goal.user_id,
                goal.title,
                goal.description,
                goal.status.as_str(),
                goal.estimated_time,
                goal.progress,
                goal.created_at.to_rfc3339(),
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_goal(&self, id: &str) -> Result<Goal, PlannerError> {
        let connection = self.connect()?;
        let sql = format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1");
        let row = connection
            .query_row(&sql, params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .optional()?;
        let Some(row) = row else {
            return Err(PlannerError::not_found("goal", id));
        };
        goal_from_row(row)
    }

    async fn update_goal(&self, goal: &Goal) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE goals
             SET title = ?2, description = ?3, status = ?4, estimated_time = ?5,
                 progress = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                goal.id,
                goal.title,
                goal.description,
                goal.status.as_str(),
                goal.estimated_time,
                goal.progress,
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(PlannerError::not_found("goal", goal.id.clone()));
        }
        Ok(())
    }

    async fn get_goals_by_ids(&self, ids: &[String]) -> Result<Vec<Goal>, PlannerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut statement = connection.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = ids
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
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(goal_from_row(row?)?);
        }
        Ok(result)
    }

    async fn create_phase(&self, phase: &Phase) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO phases (id, goal_id, title, description, status, estimated_time, progress,
                                 position, started_at, completed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                phase.id,
                phase.goal_id,
                phase.title,
                phase.description,
                phase.status.as_str(),
                phase.estimated_time,
                phase.progress,
                phase.position,
                phase.started_at.map(|stamp| stamp.to_rfc3339()),
                phase.completed_at.map(|stamp| stamp.to_rfc3339()),
                phase.created_at.to_rfc3339(),
                phase.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_phase(&self, id: &str) -> Result<Phase, PlannerError> {
        let connection = self.connect()?;
        let sql = format!("SELECT {PHASE_COLUMNS} FROM phases WHERE id = ?1");
        let row = connection
            .query_row(&sql, params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })
            .optional()?;
        let Some(row) = row else {
            return Err(PlannerError::not_found("phase", id));
        };
        phase_from_row(row)
    }

    async fn update_phase(&self, phase: &Phase) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE phases
             SET status = ?2, progress = ?3, started_at = ?4, completed_at = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                phase.id,
                phase.status.as_str(),
                phase.progress,
                phase.started_at.map(|stamp| stamp.to_rfc3339()),
                phase.completed_at.map(|stamp| stamp.to_rfc3339()),
                phase.updated_at.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(PlannerError::not_found("phase", phase.id.clone()));
        }
        Ok(())
    }

    async fn list_phases_by_goal(&self, goal_id: &str) -> Result<Vec<Phase>, PlannerError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {PHASE_COLUMNS} FROM phases WHERE goal_id = ?1 ORDER BY position, created_at"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(params![goal_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(phase_from_row(row?)?);
        }
        Ok(result)
    }

    async fn create_task(&self, task: &Task) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (id, goal_id, phase_id, title, description, status, estimated_time,
                                time_spent, completed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.goal_id,
                task.phase_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.estimated_time,
                task.time_spent,
                task.completed_at.map(|stamp| stamp.to_rfc3339()),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Task, PlannerError> {
        let connection = self.connect()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let mut tasks = query_tasks(&connection, &sql, &[&id])?;
        tasks
            .pop()
            .ok_or_else(|| PlannerError::not_found("task", id))
    }

    async fn update_task(&self, task: &Task) -> Result<(), PlannerError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE tasks
             SET title = ?2, description = ?3, status = ?4, estimated_time = ?5,
                 time_spent = ?6, completed_at = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.estimated_time,
                task.time_spent,
                task.completed_at.map(|stamp| stamp.to_rfc3339()),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(PlannerError::not_found("task", task.id.clone()));
        }
        Ok(())
    }

    async fn list_tasks_by_goal(&self, goal_id: &str) -> Result<Vec<Task>, PlannerError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE goal_id = ?1 ORDER BY created_at, id"
        );
        query_tasks(&connection, &sql, &[&goal_id])
    }

    async fn get_tasks_by_ids(&self, ids: &[String]) -> Result<Vec<Task>, PlannerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ({})",
            placeholders(ids.len())
        );
        let params: Vec<&dyn rusqlite::types::ToSql> = ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();
        query_tasks(&connection, &sql, params.as_slice())
    }
}

#[derive(Debug, Default)]
struct GoalState {
    goals: HashMap<String, Goal>,
    phases: HashMap<String, Phase>,
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryGoalStore {
    state: Mutex<GoalState>,
}

impl InMemoryGoalStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, GoalState>, PlannerError> {
        self.state
            .lock()
            .map_err(|error| PlannerError::Internal(format!("goal state lock poisoned: {error}")))
    }
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn create_goal(&self, goal: &Goal) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        state.goals.insert(goal.id.clone(), goal.clone());
        Ok(())
    }

    async fn get_goal(&self, id: &str) -> Result<Goal, PlannerError> {
        let state = self.lock()?;
        state
            .goals
            .get(id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("goal", id))
    }

    async fn update_goal(&self, goal: &Goal) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        if !state.goals.contains_key(&goal.id) {
            return Err(PlannerError::not_found("goal", goal.id.clone()));
        }
        state.goals.insert(goal.id.clone(), goal.clone());
        Ok(())
    }

    async fn get_goals_by_ids(&self, ids: &[String]) -> Result<Vec<Goal>, PlannerError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.goals.get(id).cloned())
            .collect())
    }

    async fn create_phase(&self, phase: &Phase) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        state.phases.insert(phase.id.clone(), phase.clone());
        Ok(())
    }

    async fn get_phase(&self, id: &str) -> Result<Phase, PlannerError> {
        let state = self.lock()?;
        state
            .phases
            .get(id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("phase", id))
    }

    async fn update_phase(&self, phase: &Phase) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        if !state.phases.contains_key(&phase.id) {
            return Err(PlannerError::not_found("phase", phase.id.clone()));
        }
        state.phases.insert(phase.id.clone(), phase.clone());
        Ok(())
    }

    async fn list_phases_by_goal(&self, goal_id: &str) -> Result<Vec<Phase>, PlannerError> {
        let state = self.lock()?;
        let mut result: Vec<Phase> = state
            .phases
            .values()
            .filter(|phase| phase.goal_id == goal_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.position.cmp(&b.position).then(a.created_at.cmp(&b.created_at)));
        Ok(result)
    }

    async fn create_task(&self, task: &Task) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        if !state.tasks.contains_key(&task.id) {
            state.task_order.push(task.id.clone());
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Task, PlannerError> {
        let state = self.lock()?;
        state
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("task", id))
    }

    async fn update_task(&self, task: &Task) -> Result<(), PlannerError> {
        let mut state = self.lock()?;
        if !state.tasks.contains_key(&task.id) {
            return Err(PlannerError::not_found("task", task.id.clone()));
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks_by_goal(&self, goal_id: &str) -> Result<Vec<Task>, PlannerError> {
        let state = self.lock()?;
        Ok(state
            .task_order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|task| task.goal_id == goal_id)
            .cloned()
            .collect())
    }

    async fn get_tasks_by_ids(&self, ids: &[String]) -> Result<Vec<Task>, PlannerError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect())
    }
}
