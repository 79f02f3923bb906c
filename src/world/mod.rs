pub mod cron;
pub mod prototypes;
pub mod records;
pub mod room;
pub mod state;
pub mod time;
pub mod upkeep;
