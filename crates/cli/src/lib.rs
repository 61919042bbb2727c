// Path: crates/cli/src/lib.rs

//! Shared plumbing for the `alertarc-ingest` and `alertarc-query` binaries:
//! file loading, query-filter parsing and result printing.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use alertarc_db::Database;
use alertarc_schema::{Alert, AlertReader};

/// Bucket the binaries talk to unless told otherwise.
pub const DEFAULT_BUCKET: &str = "alertarc-archive-prototyping";

/// Reads every alert out of one Avro container file.
pub fn alerts_from_file(path: &Path) -> Result<Vec<Alert>> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let reader = AlertReader::new(file)
        .with_context(|| format!("unable to read alert file {}", path.display()))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("unable to decode alerts from {}", path.display()))
}

/// Expands an ingest glob into file paths; zero matches is an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).context("invalid glob pattern")? {
        files.push(entry.context("unable to read glob entry")?);
    }
    if files.is_empty() {
        bail!("no files match {pattern:?}");
    }
    Ok(files)
}

/// Ingests every alert from every file, returning how many went in.
pub async fn ingest(db: &mut Database, files: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for path in files {
        let alerts = alerts_from_file(path)?;
        for alert in &alerts {
            db.add(alert)
                .await
                .with_context(|| format!("unable to ingest alert candid={}", alert.candid))?;
        }
        total += alerts.len() as u64;
        tracing::info!(file = %path.display(), alerts = alerts.len(), "ingested file");
    }
    Ok(total)
}

/// The raw query flags, before the exactly-one-filter rule is applied.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct QueryArgs {
    /// Query by object ID.
    #[clap(long)]
    pub object: Option<String>,

    /// Query by candidate ID.
    #[clap(long)]
    pub candidate: Option<u64>,

    /// Query by time range: start time.
    #[clap(long)]
    pub time_start: Option<String>,

    /// Query by time range: end time.
    #[clap(long)]
    pub time_end: Option<String>,

    /// Format of time inputs (only 'jd' is implemented).
    #[clap(long, default_value = "jd")]
    pub time_format: String,
}

/// One validated query.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryFilter {
    /// Single-alert lookup by candid.
    Candidate(u64),
    /// All alerts of one object.
    Object(String),
    /// All alerts in a half-open Julian Date window.
    Timerange {
        /// Start of the window, inclusive.
        start: f64,
        /// End of the window, exclusive.
        end: f64,
    },
}

/// Applies the exactly-one-filter rule and parses the time window.
pub fn parse_filter(args: &QueryArgs) -> Result<QueryFilter> {
    let mut filter: Option<QueryFilter> = None;

    if let Some(object) = &args.object {
        filter = Some(QueryFilter::Object(object.clone()));
    }

    if let Some(candidate) = args.candidate {
        if filter.is_some() {
            bail!("exactly one query filter must be specified");
        }
        filter = Some(QueryFilter::Candidate(candidate));
    }

    if args.time_start.is_some() || args.time_end.is_some() {
        let (Some(start), Some(end)) = (&args.time_start, &args.time_end) else {
            bail!("both --time-start and --time-end must be specified");
        };
        if filter.is_some() {
            bail!("exactly one query filter must be specified");
        }
        if args.time_format != "jd" {
            bail!("format not implemented: {:?}", args.time_format);
        }
        let start: f64 = start
            .parse()
            .map_err(|e| anyhow!("invalid --time-start: {e}"))?;
        let end: f64 = end.parse().map_err(|e| anyhow!("invalid --time-end: {e}"))?;
        filter = Some(QueryFilter::Timerange { start, end });
    }

    filter.ok_or_else(|| anyhow!("exactly one query filter must be specified"))
}

/// Prints one alert on one line.
pub fn print_alert(alert: &Alert) {
    match alert.candidate.magpsf {
        Some(mag) => println!(
            "alert id={}  jd={:.3}  mag={:.4}",
            alert.candid, alert.candidate.jd, mag
        ),
        None => println!(
            "alert id={}  jd={:.3}  mag=n/a",
            alert.candid, alert.candidate.jd
        ),
    }
}

/// Prints a batch of alerts, numbered.
pub fn print_alerts(alerts: &[Alert]) {
    for (i, alert) in alerts.iter().enumerate() {
        print!("{i}: ");
        print_alert(alert);
    }
}
