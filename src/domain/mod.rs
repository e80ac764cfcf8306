pub mod models;
pub mod timerange;
