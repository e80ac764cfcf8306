use crate::infrastructure::error::PlannerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const PLANNER_JSON: &str = "planner.json";

pub const DEFAULT_HORIZON_DAYS: u32 = 28;
pub const DEFAULT_UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannerConfig {
    pub schema: u8,
    pub horizon_days: u32,
    pub upcoming_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            horizon_days: DEFAULT_HORIZON_DAYS,
            upcoming_limit: DEFAULT_UPCOMING_LIMIT,
        }
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), PlannerError> {
    let path = config_dir.join(PLANNER_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&PlannerConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<PlannerConfig, PlannerError> {
    let path = config_dir.join(PLANNER_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: PlannerConfig = serde_json::from_str(&raw)?;
    if parsed.schema != 1 {
        return Err(PlannerError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            parsed.schema,
            path.display()
        )));
    }
    if parsed.horizon_days == 0 {
        return Err(PlannerError::InvalidConfig(format!(
            "horizon_days must be > 0 in {}",
            path.display()
        )));
    }
    Ok(parsed)
}
