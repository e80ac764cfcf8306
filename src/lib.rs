pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::planner::{free_intervals_for_day, pack_horizon, FreeInterval};
pub use application::progress::ProgressService;
pub use application::queries::{
    DaySchedule, DayStat, OccurrenceView, ScheduleQueryService, UpcomingView,
};
pub use application::scheduler::{
    DayAvailability, NowProvider, ScheduleService, SlotInput, WeeklyAvailability,
};
pub use domain::models::{
    Availability, Goal, GoalStatus, Occurrence, OccurrenceStatus, Phase, PhaseStatus, Task,
    TaskStatus, TimeSlot,
};
pub use infrastructure::config::{ensure_default_config, load_config, PlannerConfig};
pub use infrastructure::error::PlannerError;
pub use infrastructure::goal_repository::{GoalStore, InMemoryGoalStore, SqliteGoalStore};
pub use infrastructure::logging::init_tracing;
pub use infrastructure::schedule_repository::{
    InMemoryScheduleRepository, ScheduleRepository, SqliteScheduleRepository,
};
pub use infrastructure::storage::initialize_database;
