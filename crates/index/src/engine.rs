// Path: crates/index/src/engine.rs

//! The multi-index engine: four ordered byte-maps and the query paths over
//! them.

use std::fs;
use std::path::Path;

use alertarc_schema::Alert;
use redb::{Database, ReadableTable, TableDefinition};

use crate::bytes::{be64, candidate_key, jd_to_unix_ns, timestamp_key, PackedU64List};
use crate::error::IndexError;
use crate::healpix::PixelMapper;

/// Every sub-index database holds a single table of raw byte entries.
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

const CANDIDATES: &str = "candidates";
const OBJECTS: &str = "objects";
const TIMESTAMPS: &str = "timestamps";
const HEALPIXELS: &str = "healpixels";

/// One of the four ordered byte-maps, tagged with its name for error
/// wrapping.
struct SubIndex {
    name: &'static str,
    db: Database,
}

impl SubIndex {
    fn open(dir: &Path, name: &'static str) -> Result<Self, IndexError> {
        let db = Database::create(dir.join(name)).map_err(|e| IndexError::backend(name, e))?;
        // Ensure the table exists so later reads never race its creation.
        let w = db.begin_write().map_err(|e| IndexError::backend(name, e))?;
        w.open_table(ENTRIES)
            .map_err(|e| IndexError::backend(name, e))?;
        w.commit().map_err(|e| IndexError::backend(name, e))?;
        Ok(Self { name, db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| IndexError::backend(self.name, e))?;
        let t = r
            .open_table(ENTRIES)
            .map_err(|e| IndexError::backend(self.name, e))?;
        let out = t
            .get(key)
            .map_err(|e| IndexError::backend(self.name, e))?
            .map(|g| g.value().to_vec());
        Ok(out)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), IndexError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| IndexError::backend(self.name, e))?;
        {
            let mut t = w
                .open_table(ENTRIES)
                .map_err(|e| IndexError::backend(self.name, e))?;
            t.insert(key, value)
                .map_err(|e| IndexError::backend(self.name, e))?;
        }
        w.commit().map_err(|e| IndexError::backend(self.name, e))
    }

    /// Read-modify-write append of one candid to the packed list at `key`.
    ///
    /// The whole append runs inside a single write transaction, so one append
    /// is atomic; atomicity across sub-indexes is not provided and callers
    /// must funnel writes through a single writer.
    fn append(&self, key: &[u8], candid: u64) -> Result<(), IndexError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| IndexError::backend(self.name, e))?;
        {
            let mut t = w
                .open_table(ENTRIES)
                .map_err(|e| IndexError::backend(self.name, e))?;
            let existing = t
                .get(key)
                .map_err(|e| IndexError::backend(self.name, e))?
                .map(|g| g.value().to_vec())
                .unwrap_or_default();
            let len = existing.len();
            let mut list =
                PackedU64List::from_bytes(existing).ok_or(IndexError::BadValueLength {
                    index: self.name,
                    len,
                })?;
            list.push(candid);
            t.insert(key, list.as_bytes())
                .map_err(|e| IndexError::backend(self.name, e))?;
        }
        w.commit().map_err(|e| IndexError::backend(self.name, e))
    }

    /// Values of all entries with keys in `[lo, hi)`, ascending by key.
    fn scan(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<Vec<u8>>, IndexError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| IndexError::backend(self.name, e))?;
        let t = r
            .open_table(ENTRIES)
            .map_err(|e| IndexError::backend(self.name, e))?;
        let mut out = Vec::new();
        let range = t
            .range(lo..hi)
            .map_err(|e| IndexError::backend(self.name, e))?;
        for entry in range {
            let (_, v) = entry.map_err(|e| IndexError::backend(self.name, e))?;
            out.push(v.value().to_vec());
        }
        Ok(out)
    }
}

/// The four secondary indexes of an alert database.
///
/// Writes are single-writer: [`IndexEngine::add`] performs unsynchronized
/// read-modify-write appends across four databases, so concurrent `add` calls
/// can interleave between sub-indexes. Reads may run in parallel with each
/// other and with the writer.
pub struct IndexEngine {
    candidates: SubIndex,
    objects: SubIndex,
    timestamps: SubIndex,
    healpixels: SubIndex,
    mapper: PixelMapper,
}

impl IndexEngine {
    /// Opens (creating as needed) the four index databases under `dir`, with
    /// the pixel index interpreted at `order`.
    ///
    /// On a partial failure every already-opened database is closed before
    /// the error is returned.
    pub fn open(dir: &Path, order: u8) -> Result<Self, IndexError> {
        fs::create_dir_all(dir).map_err(IndexError::Io)?;
        Ok(Self {
            candidates: SubIndex::open(dir, CANDIDATES)?,
            objects: SubIndex::open(dir, OBJECTS)?,
            timestamps: SubIndex::open(dir, TIMESTAMPS)?,
            healpixels: SubIndex::open(dir, HEALPIXELS)?,
            mapper: PixelMapper::new(order),
        })
    }

    /// The pixel mapper this engine indexes with.
    pub fn mapper(&self) -> &PixelMapper {
        &self.mapper
    }

    /// Indexes one alert under its blob URL.
    ///
    /// Re-adding a candid overwrites its URL but appends duplicate entries to
    /// the three packed lists; nothing deduplicates them later.
    pub fn add(&self, alert: &Alert, url: &str) -> Result<(), IndexError> {
        let candid = alert.candid as u64;
        self.candidates
            .put(&candidate_key(candid), url.as_bytes())?;
        self.objects.append(alert.object_id.as_bytes(), candid)?;
        self.timestamps.append(&timestamp_key(alert), candid)?;
        let pixel = self
            .mapper
            .pixel_at(alert.candidate.ra, alert.candidate.dec);
        self.healpixels.append(&be64(pixel), candid)?;
        Ok(())
    }

    /// The blob URL for one candid. [`IndexError::NotFound`] if absent.
    pub fn get_by_candidate(&self, candid: u64) -> Result<String, IndexError> {
        let bytes = self
            .candidates
            .get(&candidate_key(candid))?
            .ok_or(IndexError::NotFound)?;
        String::from_utf8(bytes).map_err(|_| IndexError::BadUrlEncoding { candid })
    }

    /// Resolves a candid that a secondary index claims exists; a miss here is
    /// cross-index corruption, not a normal not-found.
    fn resolve(&self, candid: u64) -> Result<String, IndexError> {
        match self.get_by_candidate(candid) {
            Err(IndexError::NotFound) => Err(IndexError::CorruptIndex { candid }),
            other => other,
        }
    }

    /// Blob URLs of every alert of one object, in insertion order.
    pub fn get_by_object(&self, object_id: &str) -> Result<Vec<String>, IndexError> {
        let bytes = self
            .objects
            .get(object_id.as_bytes())?
            .ok_or(IndexError::NotFound)?;
        self.resolve_packed(OBJECTS, bytes)
    }

    /// Blob URLs of every alert observed in `[jd_start, jd_end)`, ascending
    /// by timestamp then insertion order within one timestamp.
    ///
    /// An empty or inverted range yields an empty list.
    pub fn get_by_timerange(&self, jd_start: f64, jd_end: f64) -> Result<Vec<String>, IndexError> {
        let lo = jd_to_unix_ns(jd_start);
        let hi = jd_to_unix_ns(jd_end);
        if lo >= hi {
            return Ok(Vec::new());
        }
        let mut urls = Vec::new();
        for value in self.timestamps.scan(&be64(lo), &be64(hi))? {
            urls.extend(self.resolve_packed(TIMESTAMPS, value)?);
        }
        Ok(urls)
    }

    /// Blob URLs of every alert inside (or near — coverage is inclusive) a
    /// disc of `radius_rad` radians around (`ra`, `dec`) degrees.
    ///
    /// Order is per pixel range, then by pixel key; no global order across
    /// the disc is guaranteed.
    pub fn get_by_cone(&self, ra: f64, dec: f64, radius_rad: f64) -> Result<Vec<String>, IndexError> {
        let mut urls = Vec::new();
        for range in self.mapper.query_disc_inclusive(ra, dec, radius_rad) {
            if range.start >= range.stop {
                continue;
            }
            for value in self
                .healpixels
                .scan(&be64(range.start), &be64(range.stop))?
            {
                urls.extend(self.resolve_packed(HEALPIXELS, value)?);
            }
        }
        Ok(urls)
    }

    /// Decodes one packed-list value and resolves each candid to its URL.
    fn resolve_packed(&self, index: &'static str, bytes: Vec<u8>) -> Result<Vec<String>, IndexError> {
        let len = bytes.len();
        let list =
            PackedU64List::from_bytes(bytes).ok_or(IndexError::BadValueLength { index, len })?;
        let mut urls = Vec::with_capacity(list.len());
        for candid in list.values() {
            urls.push(self.resolve(candid)?);
        }
        Ok(urls)
    }

    /// Closes the four databases.
    ///
    /// redb commits durably at the end of every write transaction, so there
    /// is nothing left to flush; dropping the handles releases the files.
    pub fn close(self) -> Result<(), IndexError> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healpix::DEFAULT_ORDER;
    use alertarc_schema::Candidate;
    use tempfile::tempdir;

    fn alert(candid: i64, object_id: &str, jd: f64, ra: f64, dec: f64) -> Alert {
        Alert {
            candid,
            object_id: object_id.to_string(),
            candidate: Candidate {
                jd,
                ra,
                dec,
                fid: 1,
                magpsf: Some(19.0),
                sigmapsf: None,
                diffmaglim: None,
                isdiffpos: Some("t".to_string()),
            },
            cutout_science: None,
            cutout_template: None,
            cutout_difference: None,
        }
    }

    fn url_for(a: &Alert) -> String {
        format!("s3://bucket/alerts/v1/{}/{}", a.object_id, a.candid)
    }

    #[test]
    fn add_and_get_by_candidate() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let a = alert(12345, "ZTF18abc", 2_459_000.5, 120.5, -33.25);
        engine.add(&a, &url_for(&a)).unwrap();

        assert_eq!(engine.get_by_candidate(12345).unwrap(), url_for(&a));
        assert!(matches!(
            engine.get_by_candidate(99),
            Err(IndexError::NotFound)
        ));
    }

    #[test]
    fn candidate_key_is_exact_bytes() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let a = alert(12345, "ZTF18abc", 2_459_000.5, 120.5, -33.25);
        engine.add(&a, "s3://b/k").unwrap();

        let raw = engine
            .candidates
            .get(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x39])
            .unwrap();
        assert_eq!(raw.as_deref(), Some(b"s3://b/k".as_ref()));
    }

    #[test]
    fn object_index_keeps_insertion_order_and_packing() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let a1 = alert(1, "X", 2_459_000.5, 10.0, 10.0);
        let a2 = alert(2, "X", 2_459_000.6, 10.0, 10.0);
        engine.add(&a1, "s3://b/x/1").unwrap();
        engine.add(&a2, "s3://b/x/2").unwrap();

        let urls = engine.get_by_object("X").unwrap();
        assert_eq!(urls, vec!["s3://b/x/1".to_string(), "s3://b/x/2".to_string()]);

        // Two candids pack into exactly 16 bytes.
        let raw = engine.objects.get(b"X").unwrap().unwrap();
        assert_eq!(raw.len(), 16);
        assert_eq!(&raw[..8], be64(1).as_slice());
        assert_eq!(&raw[8..], be64(2).as_slice());
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        assert!(matches!(
            engine.get_by_object("nope"),
            Err(IndexError::NotFound)
        ));
    }

    #[test]
    fn timerange_is_half_open_and_ordered() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let early = alert(1, "A", 2_459_000.5, 10.0, 10.0);
        let mid = alert(2, "B", 2_459_000.7, 10.0, 10.0);
        let late = alert(3, "C", 2_459_001.0, 10.0, 10.0);
        // Insert out of time order; the key encoding restores it.
        engine.add(&late, "u3").unwrap();
        engine.add(&early, "u1").unwrap();
        engine.add(&mid, "u2").unwrap();

        let urls = engine.get_by_timerange(2_459_000.5, 2_459_001.0).unwrap();
        assert_eq!(urls, vec!["u1".to_string(), "u2".to_string()]);

        // End bound excluded, start bound included.
        let all = engine.get_by_timerange(2_459_000.5, 2_459_001.1).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn empty_and_inverted_ranges_yield_nothing() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let a = alert(1, "A", 2_459_000.5, 10.0, 10.0);
        engine.add(&a, "u1").unwrap();

        assert!(engine
            .get_by_timerange(2_459_000.5, 2_459_000.5)
            .unwrap()
            .is_empty());
        assert!(engine
            .get_by_timerange(2_459_001.0, 2_459_000.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cone_search_contains_nearby_and_excludes_far() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let near = alert(1, "NEAR", 2_459_000.5, 120.5, -33.25);
        let far = alert(2, "FAR", 2_459_000.5, 300.5, 33.25);
        engine.add(&near, "near-url").unwrap();
        engine.add(&far, "far-url").unwrap();

        let radius = 5.0_f64.to_radians() / 60.0; // 5 arcmin
        let urls = engine.get_by_cone(120.5, -33.25, radius).unwrap();
        assert!(urls.contains(&"near-url".to_string()));
        assert!(!urls.contains(&"far-url".to_string()));
    }

    #[test]
    fn secondary_entry_without_candidate_is_corruption() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        engine.objects.append(b"ghost", 42).unwrap();

        match engine.get_by_object("ghost") {
            Err(IndexError::CorruptIndex { candid }) => assert_eq!(candid, 42),
            other => panic!("expected corruption error, got {other:?}"),
        }
    }

    #[test]
    fn reingest_overwrites_url_and_duplicates_lists() {
        let dir = tempdir().unwrap();
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        let a = alert(7, "DUP", 2_459_000.5, 10.0, 10.0);
        engine.add(&a, "first").unwrap();
        engine.add(&a, "second").unwrap();

        assert_eq!(engine.get_by_candidate(7).unwrap(), "second");
        let urls = engine.get_by_object("DUP").unwrap();
        assert_eq!(urls, vec!["second".to_string(), "second".to_string()]);
    }

    #[test]
    fn close_and_reopen_preserves_entries() {
        let dir = tempdir().unwrap();
        let a = alert(5, "KEEP", 2_459_000.5, 10.0, 10.0);
        {
            let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
            engine.add(&a, "kept-url").unwrap();
            engine.close().unwrap();
        }
        let engine = IndexEngine::open(dir.path(), DEFAULT_ORDER).unwrap();
        assert_eq!(engine.get_by_candidate(5).unwrap(), "kept-url");
    }
}
