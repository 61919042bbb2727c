// Path: crates/cli/src/bin/alertarc-ingest.rs

//! Ingests Avro alert files into an alertarc database.

use std::path::PathBuf;
use std::sync::Arc;

use alertarc_blob::S3Blobstore;
use alertarc_cli::{expand_glob, ingest, DEFAULT_BUCKET};
use alertarc_db::Database;
use alertarc_index::DEFAULT_ORDER;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    name = "alertarc-ingest",
    version,
    about = "Ingest Avro-encoded alert files into an alertarc database."
)]
struct Args {
    /// Directory holding the index databases and metadata sidecar.
    db_dir: PathBuf,

    /// Glob matching Avro files, each containing one or more alerts.
    pattern: String,

    /// S3 bucket receiving the alert payloads.
    #[clap(long, default_value = DEFAULT_BUCKET)]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    alertarc_telemetry::init_tracing()?;
    let args = Args::parse();

    let files = expand_glob(&args.pattern)?;

    let config = aws_config::load_from_env().await;
    let client = aws_sdk_s3::Client::new(&config);
    let blobs = Arc::new(S3Blobstore::new(client, &args.bucket));

    let mut db = Database::open(&args.db_dir, DEFAULT_ORDER, blobs)?;
    let ingested = ingest(&mut db, &files).await?;
    db.close()?;

    tracing::info!(alerts = ingested, files = files.len(), "ingest complete");
    Ok(())
}
