//! jobctl CLI - Command-line client for the jobctl HTTP gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tabled::{Table, Tabled};

const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "jobctl")]
#[command(about = "Control job lifecycles through the jobctl daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Gateway base URL
    #[arg(long, global = true, env = "JOBCTL_URL", default_value = DEFAULT_URL)]
    url: String,

    /// How long the daemon may wait for a busy job before answering 423
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List jobs
    List {
        /// Only jobs in this state (e.g. running, paused)
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Show one job
    Show { job_id: String },

    /// Submit a new job (starts out PENDING)
    Submit {
        #[arg(short, long)]
        label: Option<String>,

        /// Choose the id instead of letting the daemon generate one
        #[arg(long)]
        id: Option<String>,
    },

    /// Start a pending job
    Start { job_id: String },

    /// Resume a paused job
    Resume { job_id: String },

    /// Pause a running job
    Pause { job_id: String },

    /// Ask a job to stop gracefully
    Stop { job_id: String },

    /// Kill a job immediately
    Kill { job_id: String },

    /// Delete a stopped or killed job
    Delete { job_id: String },

    /// Show the transitions a job went through
    History { job_id: String },
}

#[derive(Debug, Deserialize)]
struct JobDto {
    id: String,
    label: Option<String>,
    state: String,
    version: i64,
    last_action: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct WarningDto {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionDto {
    version: i64,
    from: String,
    to: String,
    action: String,
    at: i64,
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    job: JobDto,
    warning: Option<WarningDto>,
    #[serde(default)]
    history: Vec<TransitionDto>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    jobs: Vec<JobDto>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDto,
}

#[derive(Debug, Deserialize)]
struct ErrorDto {
    kind: String,
    message: String,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    label: String,
    state: String,
    version: i64,
    last_action: String,
    updated: String,
}

impl From<&JobDto> for JobRow {
    fn from(job: &JobDto) -> Self {
        Self {
            id: job.id.clone(),
            label: job.label.clone().unwrap_or_default(),
            state: job.state.clone(),
            version: job.version,
            last_action: job.last_action.clone().unwrap_or_else(|| "-".to_string()),
            updated: format_millis(job.updated_at),
        }
    }
}

#[derive(Tabled)]
struct TransitionRow {
    version: i64,
    action: String,
    from: String,
    to: String,
    at: String,
}

impl From<&TransitionDto> for TransitionRow {
    fn from(record: &TransitionDto) -> Self {
        Self {
            version: record.version,
            action: record.action.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            at: format_millis(record.at),
        }
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn paint_state(state: &str) -> ColoredString {
    match state {
        "RUNNING" => state.green(),
        "PAUSED" | "STOPPING" => state.yellow(),
        "KILLED" => state.red(),
        "PENDING" => state.cyan(),
        _ => state.dimmed(),
    }
}

/// Thin JSON client over the gateway
struct Gateway {
    http: reqwest::Client,
    base: String,
    timeout_ms: Option<u64>,
}

impl Gateway {
    fn new(base: &str, timeout_ms: Option<u64>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            timeout_ms,
        }
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.base, job_id)
    }

    fn with_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout_ms {
            Some(ms) => request.query(&[("timeout_ms", ms)]),
            None => request,
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to connect to daemon at {}", self.base))?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.context("Failed to parse response");
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(body) => format!("{}: {}", body.error.kind, body.error.message),
            Err(_) => text,
        };

        match (status, retry_after) {
            (StatusCode::LOCKED, Some(secs)) => {
                anyhow::bail!("{} ({}); retry in {}s", status, detail, secs)
            }
            _ => anyhow::bail!("{} ({})", status, detail),
        }
    }

    async fn list(&self, state: Option<&str>) -> Result<JobList> {
        let mut request = self.http.get(format!("{}/jobs", self.base));
        if let Some(state) = state {
            request = request.query(&[("state", state)]);
        }
        self.call(request).await
    }

    async fn show(&self, job_id: &str) -> Result<JobEnvelope> {
        self.call(self.http.get(self.job_url(job_id))).await
    }

    async fn submit(&self, label: Option<&str>, id: Option<&str>) -> Result<JobEnvelope> {
        let mut form = Vec::new();
        if let Some(label) = label {
            form.push(("label", label));
        }
        if let Some(id) = id {
            form.push(("id", id));
        }
        self.call(self.http.post(format!("{}/jobs", self.base)).form(&form))
            .await
    }

    async fn act(&self, job_id: &str, action: &str) -> Result<JobEnvelope> {
        let request = self
            .http
            .post(self.job_url(job_id))
            .form(&[("action", action)]);
        self.call(self.with_timeout(request)).await
    }

    async fn delete(&self, job_id: &str) -> Result<JobEnvelope> {
        let request = self.http.delete(self.job_url(job_id));
        self.call(self.with_timeout(request)).await
    }
}

fn print_outcome(verb: &str, envelope: &JobEnvelope) {
    let job = &envelope.job;
    println!(
        "{} {} {} (version {})",
        format!("✓ Job {}", job.id).green().bold(),
        verb,
        paint_state(&job.state).bold(),
        job.version
    );
    if let Some(warning) = &envelope.warning {
        let reason = warning.reason.as_deref().unwrap_or("executor was not notified");
        println!("{} {}", "⚠ Warning:".yellow().bold(), reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let gateway = Gateway::new(&cli.url, cli.timeout_ms);

    match cli.command {
        Commands::List { state } => {
            let list = gateway.list(state.as_deref()).await?;
            if list.jobs.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                let rows: Vec<JobRow> = list.jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Show { job_id } => {
            let envelope = gateway.show(&job_id).await?;
            let job = &envelope.job;
            println!("{}", format!("Job {}", job.id).cyan().bold());
            println!();
            println!(
                "  {} {}",
                "Label:".bold(),
                job.label.as_deref().unwrap_or("-")
            );
            println!("  {} {}", "State:".bold(), paint_state(&job.state));
            println!("  {} {}", "Version:".bold(), job.version);
            println!(
                "  {} {}",
                "Last action:".bold(),
                job.last_action.as_deref().unwrap_or("-")
            );
            println!("  {} {}", "Created:".bold(), format_millis(job.created_at));
            println!("  {} {}", "Updated:".bold(), format_millis(job.updated_at));
        }

        Commands::Submit { label, id } => {
            let envelope = gateway.submit(label.as_deref(), id.as_deref()).await?;
            print_outcome("submitted as", &envelope);
        }

        Commands::Start { job_id } => {
            print_outcome("is now", &gateway.act(&job_id, "start").await?);
        }
        Commands::Resume { job_id } => {
            print_outcome("is now", &gateway.act(&job_id, "resume").await?);
        }
        Commands::Pause { job_id } => {
            print_outcome("is now", &gateway.act(&job_id, "pause").await?);
        }
        Commands::Stop { job_id } => {
            print_outcome("is now", &gateway.act(&job_id, "stop").await?);
        }
        Commands::Kill { job_id } => {
            print_outcome("is now", &gateway.act(&job_id, "kill").await?);
        }

        Commands::Delete { job_id } => {
            print_outcome("is now", &gateway.delete(&job_id).await?);
        }

        Commands::History { job_id } => {
            let envelope = gateway.show(&job_id).await?;
            if envelope.history.is_empty() {
                println!(
                    "{}",
                    format!("Job {} has no transitions yet", job_id).yellow()
                );
            } else {
                let rows: Vec<TransitionRow> =
                    envelope.history.iter().map(TransitionRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }

    Ok(())
}
