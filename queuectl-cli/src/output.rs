//! Tabular rendering for the human-facing commands.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::Value;

use queuectl_common::config::Config;
use queuectl_common::job::{Job, JobState};

const COMMAND_WIDTH: usize = 60;
const ERROR_WIDTH: usize = 40;

pub fn stats_table(stats: &HashMap<JobState, u64>) -> Table {
    let mut table = new_table(vec!["State", "Count"]);
    for state in JobState::ALL {
        let count = stats.get(&state).copied().unwrap_or(0);
        table.add_row(vec![state.as_str().to_uppercase(), count.to_string()]);
    }
    table
}

pub fn job_table(jobs: &[Job], verbose: bool) -> Table {
    if verbose {
        let mut table = new_table(vec![
            "ID",
            "Command",
            "State",
            "Attempts",
            "Max retries",
            "Created at",
            "Next retry at",
            "Error",
        ]);
        for job in jobs {
            table.add_row(vec![
                job.id.clone(),
                truncate(&job.command, COMMAND_WIDTH),
                job.state.to_string(),
                job.attempts.to_string(),
                job.max_retries.to_string(),
                short_timestamp(job.created_at),
                job.next_retry_at.map(short_timestamp).unwrap_or_default(),
                truncate(job.error_message.as_deref().unwrap_or(""), ERROR_WIDTH),
            ]);
        }
        table
    } else {
        let mut table = new_table(vec!["ID", "Command", "State", "Attempts"]);
        for job in jobs {
            table.add_row(vec![
                job.id.clone(),
                truncate(&job.command, COMMAND_WIDTH),
                job.state.to_string(),
                format!("{}/{}", job.attempts, job.max_retries),
            ]);
        }
        table
    }
}

pub fn dead_job_table(jobs: &[Job]) -> Table {
    let mut table = new_table(vec!["ID", "Command", "Attempts", "Error", "Updated at"]);
    for job in jobs {
        table.add_row(vec![
            job.id.clone(),
            truncate(&job.command, COMMAND_WIDTH),
            job.attempts.to_string(),
            truncate(job.error_message.as_deref().unwrap_or(""), ERROR_WIDTH),
            short_timestamp(job.updated_at),
        ]);
    }
    table
}

pub fn config_table(config: &Config) -> Table {
    let mut table = new_table(vec!["Setting", "Value"]);
    for (key, value) in config.entries() {
        let rendered = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        table.add_row(vec![key.clone(), rendered]);
    }
    table
}

fn new_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers);
    table
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}

fn short_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_only_long_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcde...");
    }

    #[test]
    fn test_stats_table_lists_every_state() {
        let mut stats = HashMap::new();
        stats.insert(JobState::Completed, 2u64);

        let rendered = stats_table(&stats).to_string();
        assert!(rendered.contains("COMPLETED"));
        assert!(rendered.contains("PENDING"));
        assert!(rendered.contains("DEAD"));
    }

    #[test]
    fn test_job_table_shows_attempt_ratio() {
        let mut job = Job::new("job-1", "echo hello", 3);
        job.attempts = 1;
        let rendered = job_table(&[job], false).to_string();
        assert!(rendered.contains("1/3"));
    }
}
