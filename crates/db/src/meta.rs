// Path: crates/db/src/meta.rs

//! Database-level metadata, persisted as a JSON sidecar next to the indexes.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use alertarc_index::bytes::jd_to_unix_ns;
use alertarc_schema::Alert;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The set of distinct UTC calendar days with data, stored as midnights.
///
/// Backed by an ordered set so serialization is always sorted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaySet(BTreeSet<DateTime<Utc>>);

impl DaySet {
    /// Records the UTC calendar day containing `t`.
    pub fn add(&mut self, t: DateTime<Utc>) {
        self.0.insert(utc_midnight(t));
    }

    /// True when the day containing `t` has been recorded.
    pub fn contains_day_of(&self, t: DateTime<Utc>) -> bool {
        self.0.contains(&utc_midnight(t))
    }

    /// Number of distinct days recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no day has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The recorded midnights in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.0.iter()
    }
}

fn utc_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Aggregate statistics about everything the database holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DbMeta {
    /// Timestamp of the earliest stored observation.
    #[serde(rename = "Earliest")]
    pub earliest: DateTime<Utc>,
    /// Timestamp of the latest stored observation.
    #[serde(rename = "Latest")]
    pub latest: DateTime<Utc>,
    /// Distinct UTC days with data.
    #[serde(rename = "Days")]
    pub days: DaySet,
    /// Total count of alerts stored.
    #[serde(rename = "NAlerts")]
    pub n_alerts: u64,
    /// Total payload bytes stored, as reported by the blob layer.
    #[serde(rename = "NBytes")]
    pub n_bytes: u64,
    /// HEALPix order the pixel index was built with. Readers must open the
    /// database at the same order.
    #[serde(rename = "HealpixOrder")]
    pub healpix_order: u8,
}

impl DbMeta {
    /// Fresh metadata for an empty database.
    ///
    /// `earliest`/`latest` start at far-future/far-past sentinels so the
    /// first observation updates both. The sentinel years are 9999 and 1000:
    /// JSON encoders demand years within [0, 9999], and the extremes of the
    /// underlying time type do not survive a round trip.
    pub fn new(healpix_order: u8) -> Self {
        DbMeta {
            earliest: sentinel(9999, 12, 31, 23, 59, 59),
            latest: sentinel(1000, 1, 1, 0, 0, 0),
            days: DaySet::default(),
            n_alerts: 0,
            n_bytes: 0,
            healpix_order,
        }
    }

    /// Folds one alert's observation epoch into the summary.
    pub fn mark_timestamps(&mut self, alert: &Alert) {
        let ns = jd_to_unix_ns(alert.candidate.jd);
        let t = DateTime::from_timestamp_nanos(ns as i64);
        if t < self.earliest {
            self.earliest = t;
        }
        if t > self.latest {
            self.latest = t;
        }
        self.days.add(t);
    }

    /// Serializes the metadata as indented JSON.
    pub fn write_to<W: Write>(&self, w: W) -> Result<(), serde_json::Error> {
        serde_json::to_writer_pretty(w, self)
    }

    /// Reads metadata back from JSON.
    pub fn read_from<R: Read>(r: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(r)
    }
}

fn sentinel(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    // All call sites are fixed, valid calendar dates.
    #[allow(clippy::expect_used)]
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .expect("sentinel date is a valid UTC timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertarc_schema::Candidate;
    use chrono::Datelike;

    fn alert(candid: i64, jd: f64) -> Alert {
        Alert {
            candid,
            object_id: "ZTF18abc".to_string(),
            candidate: Candidate {
                jd,
                ra: 120.5,
                dec: -33.25,
                fid: 1,
                magpsf: None,
                sigmapsf: None,
                diffmaglim: None,
                isdiffpos: None,
            },
            cutout_science: None,
            cutout_template: None,
            cutout_difference: None,
        }
    }

    #[test]
    fn fresh_meta_uses_far_sentinels() {
        let meta = DbMeta::new(10);
        assert_eq!(meta.earliest.year(), 9999);
        assert_eq!(meta.latest.year(), 1000);
        assert!(meta.days.is_empty());
        assert_eq!(meta.n_alerts, 0);
        assert_eq!(meta.n_bytes, 0);
    }

    #[test]
    fn first_observation_updates_both_bounds() {
        let mut meta = DbMeta::new(10);
        meta.mark_timestamps(&alert(1, 2_459_000.5));
        assert_eq!(meta.earliest, meta.latest);
        assert_eq!(meta.earliest.year(), 2020);
        assert_eq!(meta.days.len(), 1);
    }

    #[test]
    fn bounds_track_min_and_max() {
        let mut meta = DbMeta::new(10);
        meta.mark_timestamps(&alert(1, 2_459_000.5));
        meta.mark_timestamps(&alert(2, 2_459_010.5));
        meta.mark_timestamps(&alert(3, 2_459_005.5));

        let earliest = meta.earliest;
        let latest = meta.latest;
        assert!(earliest < latest);
        assert_eq!(meta.days.len(), 3);
        // The middle observation moved neither bound.
        meta.mark_timestamps(&alert(4, 2_459_005.6));
        assert_eq!(meta.earliest, earliest);
        assert_eq!(meta.latest, latest);
    }

    #[test]
    fn same_day_observations_collapse_in_day_set() {
        let mut meta = DbMeta::new(10);
        meta.mark_timestamps(&alert(1, 2_459_000.6));
        meta.mark_timestamps(&alert(2, 2_459_000.7));
        assert_eq!(meta.days.len(), 1);
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let mut meta = DbMeta::new(10);
        meta.mark_timestamps(&alert(1, 2_459_000.5));
        meta.mark_timestamps(&alert(2, 2_459_010.5));
        meta.n_alerts = 2;
        meta.n_bytes = 4096;

        let mut buf = Vec::new();
        meta.write_to(&mut buf).unwrap();
        let back = DbMeta::read_from(&buf[..]).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn sentinels_survive_a_json_round_trip() {
        let meta = DbMeta::new(10);
        let mut buf = Vec::new();
        meta.write_to(&mut buf).unwrap();
        let back = DbMeta::read_from(&buf[..]).unwrap();
        assert_eq!(back, meta);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("9999-12-31T23:59:59"));
        assert!(text.contains("1000-01-01T00:00:00"));
    }

    #[test]
    fn days_serialize_sorted() {
        let mut meta = DbMeta::new(10);
        meta.mark_timestamps(&alert(1, 2_459_010.5));
        meta.mark_timestamps(&alert(2, 2_459_000.5));

        let json = serde_json::to_value(&meta).unwrap();
        let days = json["Days"].as_array().unwrap();
        assert_eq!(days.len(), 2);
        let first = days[0].as_str().unwrap();
        let second = days[1].as_str().unwrap();
        assert!(first < second);
        assert!(first.contains("T00:00:00"));
    }
}
