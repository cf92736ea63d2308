//! Thin submission/control surface over the broker: `submit`, `status`,
//! `cancel`, and `list-queues`, each a direct call into `disqueue-core`'s
//! `JobStore`/`QueueRegistry` with no server process in between.

use clap::{Parser, Subcommand};
use disqueue_core::config::DisqueueConfig;
use disqueue_core::{JobStore, Priority};
use eyre::{eyre, Result, WrapErr};
use redis::aio::ConnectionManager;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "disqueue", about = "DisQueue job submission and control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new job to a queue.
    Submit {
        #[arg(long)]
        queue: String,
        /// Defaults to `DISQUEUE_DEFAULT_PRIORITY` (itself defaulting to `default`).
        #[arg(long)]
        priority: Option<String>,
        /// JSON payload, e.g. '{"to":"a@b.com"}'
        #[arg(long)]
        payload: String,
    },
    /// Look up a job's current status.
    Status {
        #[arg(long = "job-id")]
        job_id: String,
    },
    /// Cancel a queued or retrying job.
    Cancel {
        #[arg(long = "job-id")]
        job_id: String,
    },
    /// List the queues this deployment has configured.
    ListQueues,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DisqueueConfig::from_env().wrap_err("failed to load configuration")?;

    match cli.command {
        Command::Submit { queue, priority, payload } => {
            let priority = priority.unwrap_or_else(|| config.default_priority.as_str().to_string());
            submit(&config, &queue, &priority, &payload).await
        }
        Command::Status { job_id } => status(&config, &job_id).await,
        Command::Cancel { job_id } => cancel(&config, &job_id).await,
        Command::ListQueues => {
            list_queues(&config);
            Ok(())
        }
    }
}

async fn connect(config: &DisqueueConfig) -> Result<JobStore> {
    let client = redis::Client::open(config.redis.uri.as_str())?;
    let manager = ConnectionManager::new(client).await.wrap_err("failed to connect to broker")?;
    Ok(JobStore::new(manager))
}

async fn submit(config: &DisqueueConfig, queue_name: &str, priority_raw: &str, payload_raw: &str) -> Result<()> {
    let priority = Priority::from_str(priority_raw).map_err(|p| eyre!("unknown priority '{p}'"))?;
    config.queues.validate(queue_name, priority).map_err(|e| eyre!("{e:?}"))?;
    let payload: serde_json::Value = serde_json::from_str(payload_raw).wrap_err("payload is not valid JSON")?;

    let job_store = connect(config).await?;
    let job_id = Uuid::new_v4().to_string();
    let stream = disqueue_core::queue::stream_name(queue_name, priority);

    if job_store.enqueue(&stream, &job_id, &payload, priority).await {
        println!("{job_id}");
        Ok(())
    } else {
        Err(eyre!("failed to enqueue job"))
    }
}

async fn status(config: &DisqueueConfig, job_id: &str) -> Result<()> {
    let job_store = connect(config).await?;
    match job_store.get_status(job_id).await {
        Some(status) => {
            println!("{status}");
            Ok(())
        }
        None => Err(eyre!("no such job: {job_id}")),
    }
}

async fn cancel(config: &DisqueueConfig, job_id: &str) -> Result<()> {
    use disqueue_core::Status;

    let job_store = connect(config).await?;
    match job_store.get_status(job_id).await {
        None => Err(eyre!("no such job: {job_id}")),
        Some(Status::Cancelled) => {
            // Idempotent: cancelling an already-cancelled job succeeds.
            println!("cancelled {job_id}");
            Ok(())
        }
        Some(status) if !status.is_cancellable() => Err(eyre!("job {job_id} is not cancellable (status: {status})")),
        Some(_) => {
            if job_store.cancel(job_id).await {
                println!("cancelled {job_id}");
                Ok(())
            } else {
                Err(eyre!("no such job: {job_id}"))
            }
        }
    }
}

fn list_queues(config: &DisqueueConfig) {
    for queue in config.queues.list() {
        let priorities: Vec<_> = queue.priorities.iter().map(Priority::as_str).collect();
        println!("{}\tpriorities={:?}\tretry_limit={}\tdlq={}", queue.name, priorities, queue.retry_limit, queue.dlq_enabled);
    }
}
