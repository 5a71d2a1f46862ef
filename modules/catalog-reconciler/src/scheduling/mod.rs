pub mod cron;
pub mod scheduler;

pub use cron::CronSchedule;
pub use scheduler::run_on_schedule;
