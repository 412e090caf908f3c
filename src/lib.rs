pub mod config;
pub mod descriptor;
pub mod duration;
pub mod error;
pub mod fetch;
mod fs_utils;
pub mod job;
pub mod license;
pub mod playlist;
mod retry_policies;

pub use job::{Job, JobBuilder, RunOutcome, RunReport};
