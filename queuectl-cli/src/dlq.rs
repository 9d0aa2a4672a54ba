//! Dead letter queue commands.

use queuectl_common::config::Config;
use queuectl_common::job::JobState;

use crate::jobs::open_queue;
use crate::output;

pub async fn list(config: &Config, limit: Option<u32>) -> anyhow::Result<()> {
    let queue = open_queue(config).await?;
    let jobs = queue.list(Some(JobState::Dead), limit).await?;

    if jobs.is_empty() {
        println!("No jobs in the dead letter queue");
        return Ok(());
    }

    println!("Dead letter queue ({} job(s)):", jobs.len());
    println!("{}", output::dead_job_table(&jobs));
    Ok(())
}

pub async fn retry(config: &Config, job_id: &str) -> anyhow::Result<()> {
    let queue = open_queue(config).await?;
    let job = queue.requeue_from_dead(job_id).await?;
    println!("Requeued job {} for retry", job.id);
    Ok(())
}

pub async fn clear(config: &Config, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = inquire::Confirm::new("Clear the entire dead letter queue?")
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    let queue = open_queue(config).await?;
    let cleared = queue.clear_dead().await?;
    println!("Cleared {cleared} job(s) from the dead letter queue");
    Ok(())
}
