//! Job admission and inspection commands.

use anyhow::Context;

use queuectl_common::config::Config;
use queuectl_common::job::{JobRequest, JobState};
use queuectl_common::queue::Queue;
use queuectl_common::store::JobStore;

use crate::output;

/// Open the store named by the configuration and wrap it in the admission
/// facade.
pub async fn open_queue(config: &Config) -> anyhow::Result<Queue> {
    let store = JobStore::new(config.db_path())
        .await
        .with_context(|| format!("failed to open the job store at {}", config.db_path()))?;
    Ok(Queue::new(store, config.max_retries()))
}

pub async fn enqueue(config: &Config, spec: &str) -> anyhow::Result<()> {
    let request = parse_spec(spec)?;
    let queue = open_queue(config).await?;
    let job = queue.submit(request).await?;

    println!("Enqueued job {}", job.id);
    println!("  command: {}", job.command);
    println!("  max retries: {}", job.max_retries);
    Ok(())
}

/// A spec that parses as a JSON object is a structured descriptor;
/// anything else is taken verbatim as the command to run.
fn parse_spec(spec: &str) -> anyhow::Result<JobRequest> {
    match serde_json::from_str::<serde_json::Value>(spec) {
        Ok(value) if value.is_object() => serde_json::from_value(value)
            .context("invalid job descriptor: a 'command' field is required"),
        _ => Ok(JobRequest::from_command(spec)),
    }
}

pub async fn status(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let queue = open_queue(config).await?;
    let stats = queue.stats().await?;

    println!("Job statistics:");
    println!("{}", output::stats_table(&stats));
    if verbose {
        println!();
        println!("Configuration ({}):", config.path().display());
        println!("{}", output::config_table(config));
    }
    Ok(())
}

pub async fn list(
    config: &Config,
    state: Option<&str>,
    limit: Option<u32>,
    verbose: bool,
) -> anyhow::Result<()> {
    let state = state.map(str::parse::<JobState>).transpose()?;
    let queue = open_queue(config).await?;
    let jobs = queue.list(state, limit).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!("Found {} job(s):", jobs.len());
    println!("{}", output::job_table(&jobs, verbose));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_spec_is_a_descriptor() {
        let request = parse_spec(r#"{"id": "job1", "command": "echo hi", "max-retries": 4}"#)
            .unwrap();
        assert_eq!(request.id.as_deref(), Some("job1"));
        assert_eq!(request.command, "echo hi");
        assert_eq!(request.max_retries, Some(4));
    }

    #[test]
    fn test_bare_string_is_a_command() {
        let request = parse_spec("echo 'Hello World'").unwrap();
        assert!(request.id.is_none());
        assert_eq!(request.command, "echo 'Hello World'");
        assert!(request.max_retries.is_none());
    }

    #[test]
    fn test_descriptor_without_command_is_rejected() {
        assert!(parse_spec(r#"{"id": "job1"}"#).is_err());
    }
}
