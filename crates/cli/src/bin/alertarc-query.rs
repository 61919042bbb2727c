// Path: crates/cli/src/bin/alertarc-query.rs

//! Queries an alertarc database by candidate, object or time range.

use std::path::PathBuf;
use std::sync::Arc;

use alertarc_blob::S3Blobstore;
use alertarc_cli::{parse_filter, print_alert, print_alerts, QueryArgs, QueryFilter, DEFAULT_BUCKET};
use alertarc_db::Database;
use alertarc_index::DEFAULT_ORDER;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    name = "alertarc-query",
    version,
    about = "Query an alertarc database. Exactly one of --object, --candidate or --time-start/--time-end must be given."
)]
struct Args {
    #[clap(flatten)]
    query: QueryArgs,

    /// Path to the alerts database directory.
    #[clap(long, default_value = "alerts.db")]
    db: PathBuf,

    /// S3 bucket holding the alert payloads.
    #[clap(long, default_value = DEFAULT_BUCKET)]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    alertarc_telemetry::init_tracing()?;
    let args = Args::parse();
    let filter = parse_filter(&args.query)?;

    let config = aws_config::load_from_env().await;
    let client = aws_sdk_s3::Client::new(&config);
    let blobs = Arc::new(S3Blobstore::new(client, &args.bucket));

    let db = Database::open(&args.db, DEFAULT_ORDER, blobs)?;
    match filter {
        QueryFilter::Candidate(id) => {
            let alert = db.get_by_candidate_id(id).await?;
            print_alert(&alert);
        }
        QueryFilter::Object(id) => {
            let alerts = db.get_by_object_id(&id).await?;
            print_alerts(&alerts);
        }
        QueryFilter::Timerange { start, end } => {
            let alerts = db.get_by_timerange(start, end).await?;
            print_alerts(&alerts);
        }
    }
    db.close()?;
    Ok(())
}
