use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::store::Index;

const STATION_SNAPSHOT: &str = "station.store";
const TRAIN_SNAPSHOT: &str = "trein.store";

/// Contract for keeping the final store contents across restarts. The
/// daemon hands both indices over on shutdown and restores them on request
/// at startup; the on-disk format is the adapter's business.
pub trait SnapshotStore {
    fn save(&self, by_station: &Index, by_train: &Index) -> Result<(), SnapshotError>;
    fn load_station_index(&self) -> Result<Index, SnapshotError>;
    fn load_train_index(&self) -> Result<Index, SnapshotError>;
}

#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
}

impl error::Error for SnapshotError {}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnapshotError::Io(why) => write!(f, "snapshot I/O error: {}", why),
            SnapshotError::Encode(why) => write!(f, "cannot encode snapshot: {}", why),
            SnapshotError::Decode(why) => write!(f, "cannot decode snapshot: {}", why),
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(why: io::Error) -> Self {
        SnapshotError::Io(why)
    }
}

impl From<rmp_serde::encode::Error> for SnapshotError {
    fn from(why: rmp_serde::encode::Error) -> Self {
        SnapshotError::Encode(why)
    }
}

impl From<rmp_serde::decode::Error> for SnapshotError {
    fn from(why: rmp_serde::decode::Error) -> Self {
        SnapshotError::Decode(why)
    }
}

/// The default adapter: one MessagePack file per index inside a directory.
pub struct FileSnapshotStore {
    directory: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn write(&self, name: &str, index: &Index) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.directory)?;
        let encoded = rmp_serde::to_vec_named(index)?;
        fs::write(self.directory.join(name), encoded)?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Index, SnapshotError> {
        let encoded = fs::read(self.directory.join(name))?;
        Ok(rmp_serde::from_slice(&encoded)?)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, by_station: &Index, by_train: &Index) -> Result<(), SnapshotError> {
        self.write(STATION_SNAPSHOT, by_station)?;
        self.write(TRAIN_SNAPSHOT, by_train)
    }

    fn load_station_index(&self) -> Result<Index, SnapshotError> {
        self.read(STATION_SNAPSHOT)
    }

    fn load_train_index(&self) -> Result<Index, SnapshotError> {
        self.read(TRAIN_SNAPSHOT)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::store::Bucket;
    use crate::testutil;

    use super::*;

    #[test]
    fn index_round_trips_field_for_field() {
        let t0 = Utc.with_ymd_and_hms(2014, 4, 12, 10, 0, 0).unwrap();
        let mut train = testutil::train("1234", "RTD", t0, t0 + Duration::seconds(300));
        train.train_name = Some("Nachtnettrein".to_owned());
        train.departed_timestamp = Some(t0 + Duration::seconds(600));

        let mut bucket = Bucket::new();
        bucket.insert("1234".to_owned(), train);
        let mut index = Index::new();
        index.insert("RTD".to_owned(), bucket);

        let encoded = rmp_serde::to_vec_named(&index).unwrap();
        let decoded: Index = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn files_round_trip_through_a_directory() {
        let t0 = Utc.with_ymd_and_hms(2014, 4, 12, 10, 0, 0).unwrap();
        let mut index = Index::new();
        index
            .entry("RTD".to_owned())
            .or_default()
            .insert("1234".to_owned(), testutil::train("1234", "RTD", t0, t0));

        let directory = std::env::temp_dir().join(format!(
            "dvs-snapshot-test-{}",
            std::process::id()
        ));
        let adapter = FileSnapshotStore::new(&directory);
        adapter.save(&index, &Index::new()).unwrap();

        assert_eq!(adapter.load_station_index().unwrap(), index);
        assert_eq!(adapter.load_train_index().unwrap(), Index::new());

        fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn missing_snapshot_reports_io_error() {
        let adapter = FileSnapshotStore::new("/nonexistent/dvs-snapshots");
        assert!(matches!(
            adapter.load_station_index(),
            Err(SnapshotError::Io(_))
        ));
    }
}
