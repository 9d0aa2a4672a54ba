pub mod commands;
pub mod dlq;
pub mod jobs;
pub mod output;
pub mod settings;
pub mod workers;

pub mod cmd {
    pub use super::commands::Cli;
}
