//! Job Status CLI
//!
//! Command-line access to the job status repository.
//!
//! # Usage
//!
//! ```bash
//! # Record a status event
//! jobstatus add --app App1 --job J1 --status START \
//!     --ts 2023-07-01T10:00:00Z --business-date 2023-07-01
//!
//! # Read a job's events
//! jobstatus get --job J1 --business-date 2023-07-01
//!
//! # Equality query over any fields
//! jobstatus query --job J1 --business-date 2023-07-01
//! ```
//!
//! Connection settings come from `JOBSTATUS_DSN` (or `DATABASE_URL`), read
//! after loading `.env`.

use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use jobstatus_core::{
    ClassifiedError, Column, ErrorKind, FilterSet, JobStatusDto, JobStatusRecord, JobStatusRepo,
    PostgresJobStatusRepo, RepoConfig,
};

// =============================================================================
// Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "jobstatus";

/// Provenance component for failures raised by the CLI itself
const COMPONENT: &str = "cli";

const EXIT_CODE_REJECTED: u8 = 2;
const EXIT_CODE_DUPLICATE: u8 = 3;
const EXIT_CODE_FAILURE: u8 = 1;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Job status repository CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a job status event
    Add {
        #[arg(long)]
        app: String,
        #[arg(long)]
        job: String,
        /// START, SUCCEED, FAIL or INVALID
        #[arg(long)]
        status: String,
        /// RFC 3339 timestamp
        #[arg(long)]
        ts: DateTime<Utc>,
        /// YYYY-MM-DD
        #[arg(long)]
        business_date: NaiveDate,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        host_id: Option<String>,
    },
    /// Read the events of one job
    Get {
        #[arg(long)]
        job: String,
        /// Restrict to one business date (YYYY-MM-DD)
        #[arg(long)]
        business_date: Option<NaiveDate>,
    },
    /// Equality query over any combination of fields
    Query {
        #[arg(long)]
        app: Option<String>,
        #[arg(long)]
        job: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        ts: Option<String>,
        #[arg(long)]
        business_date: Option<String>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        host_id: Option<String>,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ClassifiedError>() {
            Some(classified) => {
                classified.log("jobstatus command failed");
                ExitCode::from(exit_code(classified.kind()))
            }
            None => {
                tracing::error!(error = %e, "jobstatus command failed");
                ExitCode::from(EXIT_CODE_FAILURE)
            }
        },
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = RepoConfig::from_env()
        .map_err(|e| ClassifiedError::new(ErrorKind::Config, e, COMPONENT, "load_config"))?;
    tracing::debug!(
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "configuration loaded"
    );

    // Reject bad input before connecting.
    let request = Request::parse(command)?;

    let mut repo = PostgresJobStatusRepo::new(config);
    repo.open().await?;
    let result = execute(&repo, request).await;
    repo.close().await;
    result
}

/// A command with its arguments validated.
enum Request {
    Add(JobStatusRecord),
    Get {
        job_id: String,
        business_date: Option<NaiveDate>,
    },
    Query(FilterSet),
}

impl Request {
    fn parse(command: Commands) -> Result<Self, ClassifiedError> {
        match command {
            Commands::Add {
                app,
                job,
                status,
                ts,
                business_date,
                run_id,
                host_id,
            } => {
                let dto = JobStatusDto {
                    application_id: app,
                    job_id: job,
                    job_status_code: status,
                    job_status_timestamp: ts,
                    business_date,
                    run_id,
                    host_id,
                };
                JobStatusRecord::new(dto.clone())
                    .map(Request::Add)
                    .map_err(|e| {
                        ClassifiedError::new(ErrorKind::Props, e, COMPONENT, "add").with_data(&dto)
                    })
            }
            Commands::Get { job, business_date } => Ok(Request::Get {
                job_id: job,
                business_date,
            }),
            Commands::Query {
                app,
                job,
                status,
                ts,
                business_date,
                run_id,
                host_id,
            } => {
                let params: Vec<(&str, String)> = [
                    (Column::ApplicationId, app),
                    (Column::JobId, job),
                    (Column::JobStatusCode, status),
                    (Column::JobStatusTimestamp, ts),
                    (Column::BusinessDate, business_date),
                    (Column::RunId, run_id),
                    (Column::HostId, host_id),
                ]
                .into_iter()
                .filter_map(|(column, value)| value.map(|v| (column.field_name(), v)))
                .collect();

                FilterSet::from_params(params.iter().map(|(k, v)| (*k, v.as_str())))
                    .map(Request::Query)
                    .map_err(|e| {
                        ClassifiedError::new(ErrorKind::InvalidQuery, e, COMPONENT, "query")
                    })
            }
        }
    }
}

async fn execute(repo: &dyn JobStatusRepo, request: Request) -> anyhow::Result<()> {
    let records = match request {
        Request::Add(record) => {
            repo.add(&record).await?;
            tracing::info!(job_id = record.job_id(), "job status recorded");
            vec![record]
        }
        Request::Get {
            job_id,
            business_date: Some(date),
        } => repo.get_by_job_id_business_date(&job_id, date).await?,
        Request::Get {
            job_id,
            business_date: None,
        } => repo.get_by_job_id(&job_id).await?,
        Request::Query(filters) => repo.get_by_query(&filters).await?,
    };

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Process exit status for a failure kind.
fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidQuery | ErrorKind::Props => EXIT_CODE_REJECTED,
        ErrorKind::DuplicateRow => EXIT_CODE_DUPLICATE,
        _ => EXIT_CODE_FAILURE,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Request, ClassifiedError> {
        let cli = Cli::try_parse_from(args).unwrap();
        Request::parse(cli.command)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(ErrorKind::InvalidQuery), 2);
        assert_eq!(exit_code(ErrorKind::Props), 2);
        assert_eq!(exit_code(ErrorKind::DuplicateRow), 3);
        assert_eq!(exit_code(ErrorKind::ConnectionException), 1);
        assert_eq!(exit_code(ErrorKind::NoDsn), 1);
    }

    #[test]
    fn test_parse_add() {
        let request = parse(&[
            "jobstatus",
            "add",
            "--app",
            "App1",
            "--job",
            "J1",
            "--status",
            "START",
            "--ts",
            "2023-07-01T10:00:00Z",
            "--business-date",
            "2023-07-01",
        ])
        .unwrap();
        match request {
            Request::Add(record) => {
                assert_eq!(record.job_id(), "J1");
                assert!(record.run_id().is_none());
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_parse_add_rejects_bad_status() {
        let err = parse(&[
            "jobstatus",
            "add",
            "--app",
            "App1",
            "--job",
            "J1",
            "--status",
            "RUNNING",
            "--ts",
            "2023-07-01T10:00:00Z",
            "--business-date",
            "2023-07-01",
        ])
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Props);
        assert!(err.data().is_some());
    }

    #[test]
    fn test_parse_query() {
        let request = parse(&[
            "jobstatus",
            "query",
            "--job",
            "J1",
            "--business-date",
            "2023-07-01",
        ])
        .unwrap();
        match request {
            Request::Query(filters) => {
                assert_eq!(filters.len(), 2);
                assert!(filters.contains(Column::JobId));
                assert!(filters.contains(Column::BusinessDate));
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_parse_query_rejects_bad_date() {
        let err = parse(&["jobstatus", "query", "--business-date", "July 1st"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }
}
