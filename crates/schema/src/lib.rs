// Path: crates/schema/src/lib.rs

//! Survey alert records and their Avro wire codec.
//!
//! An [`Alert`] is one observation of one transient candidate. On the wire
//! (and in the blob store) alerts travel as Avro object container files, so
//! every payload is self-describing; [`AlertReader`] iterates the same format
//! off disk for ingest.

use std::io::{Read, Write};

use apache_avro::{from_value, Reader, Schema, Writer};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The Avro schema every alert payload is written with.
///
/// A trimmed-down cousin of the public survey schemas: the identifiers, the
/// observation epoch and position, the photometry needed for human-readable
/// output, and the image cutouts.
const ALERT_SCHEMA_JSON: &str = r#"
{
  "type": "record",
  "name": "Alert",
  "namespace": "alertarc",
  "fields": [
    {"name": "candid", "type": "long"},
    {"name": "objectId", "type": "string"},
    {"name": "candidate", "type": {
      "type": "record",
      "name": "Candidate",
      "fields": [
        {"name": "jd", "type": "double"},
        {"name": "ra", "type": "double"},
        {"name": "dec", "type": "double"},
        {"name": "fid", "type": "int"},
        {"name": "magpsf", "type": ["null", "float"], "default": null},
        {"name": "sigmapsf", "type": ["null", "float"], "default": null},
        {"name": "diffmaglim", "type": ["null", "float"], "default": null},
        {"name": "isdiffpos", "type": ["null", "string"], "default": null}
      ]
    }},
    {"name": "cutoutScience", "type": ["null", "bytes"], "default": null},
    {"name": "cutoutTemplate", "type": ["null", "bytes"], "default": null},
    {"name": "cutoutDifference", "type": ["null", "bytes"], "default": null}
  ]
}
"#;

static ALERT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    // The schema is a compile-time constant; a parse failure is a programming
    // error, not a runtime condition.
    #[allow(clippy::expect_used)]
    Schema::parse_str(ALERT_SCHEMA_JSON).expect("embedded alert schema must parse")
});

/// Returns the parsed Avro schema for alert payloads.
pub fn alert_schema() -> &'static Schema {
    &ALERT_SCHEMA
}

/// Errors from encoding or decoding alert records.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Serializing an alert to Avro failed.
    #[error("unable to serialize alert object_id={object_id}: {source}")]
    Serialize {
        /// Object id of the alert that failed to encode.
        object_id: String,
        /// Underlying Avro error.
        #[source]
        source: apache_avro::Error,
    },
    /// Decoding Avro bytes into an alert failed.
    #[error("unable to deserialize alert: {0}")]
    Deserialize(#[source] apache_avro::Error),
    /// An Avro container held no alert record.
    #[error("alert payload contains no records")]
    Empty,
    /// Reading an alert container file failed.
    #[error("unable to read alert file: {0}")]
    File(#[source] apache_avro::Error),
    /// Writing an alert container failed.
    #[error("unable to write alert container: {0}")]
    Write(#[source] apache_avro::Error),
}

/// Per-observation measurements attached to an alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Observation epoch as a Julian Date.
    pub jd: f64,
    /// Right ascension, degrees.
    pub ra: f64,
    /// Declination, degrees.
    pub dec: f64,
    /// Filter id of the exposure.
    pub fid: i32,
    /// PSF-fit magnitude.
    pub magpsf: Option<f32>,
    /// 1-sigma uncertainty on `magpsf`.
    pub sigmapsf: Option<f32>,
    /// 5-sigma limiting magnitude of the difference image.
    pub diffmaglim: Option<f32>,
    /// "t" if the candidate is a positive subtraction, "f" otherwise.
    pub isdiffpos: Option<String>,
}

/// One survey alert: a unique candidate detection tied to a source object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Globally unique candidate id.
    pub candid: i64,
    /// Source object this detection is associated with.
    #[serde(rename = "objectId")]
    pub object_id: String,
    /// Measurements for this detection.
    pub candidate: Candidate,
    /// Science image cutout, raw bytes.
    #[serde(rename = "cutoutScience")]
    pub cutout_science: Option<serde_bytes::ByteBuf>,
    /// Reference template cutout, raw bytes.
    #[serde(rename = "cutoutTemplate")]
    pub cutout_template: Option<serde_bytes::ByteBuf>,
    /// Difference image cutout, raw bytes.
    #[serde(rename = "cutoutDifference")]
    pub cutout_difference: Option<serde_bytes::ByteBuf>,
}

impl Alert {
    /// Encodes the alert as a self-describing Avro object container.
    pub fn serialize(&self) -> Result<Vec<u8>, SchemaError> {
        let mut writer = Writer::new(&ALERT_SCHEMA, Vec::new());
        writer.append_ser(self).map_err(|e| SchemaError::Serialize {
            object_id: self.object_id.clone(),
            source: e,
        })?;
        writer.into_inner().map_err(|e| SchemaError::Serialize {
            object_id: self.object_id.clone(),
            source: e,
        })
    }

    /// Decodes a single alert from Avro object container bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Alert, SchemaError> {
        let mut reader = Reader::new(bytes).map_err(SchemaError::Deserialize)?;
        let value = reader
            .next()
            .ok_or(SchemaError::Empty)?
            .map_err(SchemaError::Deserialize)?;
        from_value::<Alert>(&value).map_err(SchemaError::Deserialize)
    }
}

/// Streams alerts out of an Avro object container file.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let f = std::fs::File::open("alerts.avro")?;
/// for alert in alertarc_schema::AlertReader::new(f)? {
///     println!("{}", alert?.candid);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AlertReader<R: Read> {
    inner: Reader<'static, R>,
}

impl<R: Read> AlertReader<R> {
    /// Opens a container; the schema is read from the file header.
    pub fn new(reader: R) -> Result<Self, SchemaError> {
        let inner = Reader::new(reader).map_err(SchemaError::File)?;
        Ok(Self { inner })
    }
}

impl<R: Read> Iterator for AlertReader<R> {
    type Item = Result<Alert, SchemaError>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = match self.inner.next()? {
            Ok(v) => v,
            Err(e) => return Some(Err(SchemaError::File(e))),
        };
        Some(from_value::<Alert>(&value).map_err(SchemaError::Deserialize))
    }
}

/// Writes a batch of alerts as one Avro object container.
///
/// This is the file format `alertarc-ingest` consumes; tests and tooling use
/// it to produce fixtures.
pub fn write_alerts<W: Write>(w: W, alerts: &[Alert]) -> Result<(), SchemaError> {
    let mut writer = Writer::new(&ALERT_SCHEMA, w);
    for alert in alerts {
        writer.append_ser(alert).map_err(|e| SchemaError::Serialize {
            object_id: alert.object_id.clone(),
            source: e,
        })?;
    }
    writer.flush().map_err(SchemaError::Write).map(|_| ())
}
