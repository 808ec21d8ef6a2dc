use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RetrievalError;
use crate::sknn::Neighborhood;

pub type ItemId = u64;

/// Position of a session in the full, chronologically ordered dataset.
/// This is the only notion of time available: lower means earlier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetPosition(pub u32);

/// Position of a session inside the canonical (de-augmented) session set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalPosition(pub u32);

impl DatasetPosition {
    pub fn from_index(index: usize) -> Self {
        DatasetPosition(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DatasetPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CanonicalPosition {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("unable to read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path}, record {record}: cannot parse '{value}' as {expected}")]
    Parse {
        path: String,
        record: usize,
        value: String,
        expected: &'static str,
    },

    #[error("{path}, record {record}: empty session")]
    EmptySession { path: String, record: usize },

    #[error("{path}, record {record}: more sessions than positions can address")]
    TooManySessions { path: String, record: usize },

    #[error("{path}, record {record}: canonical session without a dataset position")]
    MissingPosition { path: String, record: usize },

    #[error("unable to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to encode or decode neighborhoods: {0}")]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// The full dataset. Every session ends with its next-click target.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    sessions: Vec<Vec<ItemId>>,
}

impl Dataset {
    pub fn new(sessions: Vec<Vec<ItemId>>) -> Self {
        debug_assert!(sessions.len() <= u32::MAX as usize);
        Dataset { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All items of the session, target included.
    pub fn session(&self, position: DatasetPosition) -> Option<&[ItemId]> {
        self.sessions.get(position.index()).map(|items| items.as_slice())
    }

    /// The session without its trailing target item.
    pub fn feature_items(&self, position: DatasetPosition) -> Option<&[ItemId]> {
        self.session(position).map(feature_items)
    }
}

pub(crate) fn feature_items(session: &[ItemId]) -> &[ItemId] {
    match session.split_last() {
        Some((_target, features)) => features,
        None => session,
    }
}

/// The de-augmented sessions used to build the item index, each paired with
/// the position the session has in the full dataset.
#[derive(Debug, Clone, Default)]
pub struct CanonicalSessions {
    sessions: Vec<Vec<ItemId>>,
    dataset_positions: Vec<DatasetPosition>,
}

impl CanonicalSessions {
    pub fn new(
        sessions: Vec<Vec<ItemId>>,
        dataset_positions: Vec<DatasetPosition>,
    ) -> Result<Self, RetrievalError> {
        if sessions.len() != dataset_positions.len() {
            return Err(RetrievalError::CanonicalMismatch {
                num_sessions: sessions.len(),
                num_positions: dataset_positions.len(),
            });
        }
        Ok(CanonicalSessions {
            sessions,
            dataset_positions,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn dataset_position(&self, position: CanonicalPosition) -> Option<DatasetPosition> {
        self.dataset_positions.get(position.index()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalPosition, DatasetPosition, &[ItemId])> {
        self.sessions
            .iter()
            .zip(self.dataset_positions.iter())
            .enumerate()
            .map(|(canonical, (items, dataset_position))| {
                (
                    CanonicalPosition(canonical as u32),
                    *dataset_position,
                    items.as_slice(),
                )
            })
    }

    /// Fails when a canonical session points outside of the full dataset.
    pub fn check_positions(&self, dataset: &Dataset) -> Result<(), RetrievalError> {
        match self
            .dataset_positions
            .iter()
            .find(|position| position.index() >= dataset.len())
        {
            Some(position) => Err(RetrievalError::PositionOutOfRange {
                position: *position,
                dataset_len: dataset.len(),
            }),
            None => Ok(()),
        }
    }
}

fn session_reader(path: &Path) -> Result<csv::Reader<File>, DatasetError> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| DatasetError::Csv {
            path: path.display().to_string(),
            source,
        })
}

fn parse_field<T: std::str::FromStr>(
    path: &Path,
    record: usize,
    field: &str,
    expected: &'static str,
) -> Result<T, DatasetError> {
    field.trim().parse::<T>().map_err(|_| DatasetError::Parse {
        path: path.display().to_string(),
        record,
        value: field.to_string(),
        expected,
    })
}

/// The csv reader skips blank lines, which would shift every later session.
fn check_no_gap(
    path: &Path,
    record_number: usize,
    record: &csv::StringRecord,
) -> Result<(), DatasetError> {
    match record.position() {
        Some(position) if position.line() != record_number as u64 + 1 => {
            Err(DatasetError::EmptySession {
                path: path.display().to_string(),
                record: record_number,
            })
        }
        _ => Ok(()),
    }
}

fn dataset_position(path: &Path, record_number: usize) -> Result<DatasetPosition, DatasetError> {
    u32::try_from(record_number)
        .map(DatasetPosition)
        .map_err(|_| DatasetError::TooManySessions {
            path: path.display().to_string(),
            record: record_number,
        })
}

/// Reads the full dataset: one tab separated session per line, items in
/// click order, the last item being the target. The line number is the
/// dataset position, so blank lines are rejected.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let mut reader = session_reader(path)?;
    let mut sessions = Vec::new();

    for (record_number, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        check_no_gap(path, record_number, &record)?;
        dataset_position(path, record_number)?;
        let session = record
            .iter()
            .filter(|field| !field.trim().is_empty())
            .map(|field| parse_field::<ItemId>(path, record_number, field, "item id"))
            .collect::<Result<Vec<_>, _>>()?;
        if session.is_empty() {
            return Err(DatasetError::EmptySession {
                path: path.display().to_string(),
                record: record_number,
            });
        }
        sessions.push(session);
    }

    Ok(Dataset::new(sessions))
}

/// Reads the canonical set: per line the dataset position followed by the
/// items of the session, tab separated.
pub fn read_canonical_sessions<P: AsRef<Path>>(path: P) -> Result<CanonicalSessions, DatasetError> {
    let path = path.as_ref();
    let mut reader = session_reader(path)?;
    let mut sessions = Vec::new();
    let mut dataset_positions = Vec::new();

    for (record_number, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        check_no_gap(path, record_number, &record)?;
        let mut fields = record.iter().filter(|field| !field.trim().is_empty());
        let position = match fields.next() {
            Some(field) => parse_field::<u32>(path, record_number, field, "dataset position")?,
            None => {
                return Err(DatasetError::MissingPosition {
                    path: path.display().to_string(),
                    record: record_number,
                })
            }
        };
        let session = fields
            .map(|field| parse_field::<ItemId>(path, record_number, field, "item id"))
            .collect::<Result<Vec<_>, _>>()?;
        dataset_positions.push(DatasetPosition(position));
        sessions.push(session);
    }

    Ok(CanonicalSessions::new(sessions, dataset_positions)?)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Writes one line per session: `0` when there are no neighbors, otherwise
/// the comma separated neighbor positions, most similar first.
pub fn write_neighborhoods_text<P: AsRef<Path>>(
    path: P,
    neighborhoods: &[Neighborhood],
) -> Result<(), DatasetError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    for neighborhood in neighborhoods {
        writeln!(writer, "{}", neighborhood.to_legacy_line()).map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))
}

/// Reads the text form back. A line holding a single `0` is always read as
/// "no neighbors", so a lone neighbor at position 0 does not survive.
pub fn read_neighborhoods_text<P: AsRef<Path>>(path: P) -> Result<Vec<Neighborhood>, DatasetError> {
    let path = path.as_ref();
    let lines = create_buffered_line_reader(path).map_err(io_error(path))?;
    let mut neighborhoods = Vec::new();
    for (line_number, line) in lines.enumerate() {
        let line = line.map_err(io_error(path))?;
        let neighborhood = Neighborhood::from_legacy_line(&line).ok_or_else(|| DatasetError::Parse {
            path: path.display().to_string(),
            record: line_number,
            value: line.clone(),
            expected: "neighborhood",
        })?;
        neighborhoods.push(neighborhood);
    }
    Ok(neighborhoods)
}

pub fn write_neighborhoods_bincode<P: AsRef<Path>>(
    path: P,
    neighborhoods: &[Neighborhood],
) -> Result<(), DatasetError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, neighborhoods)?;
    writer.flush().map_err(io_error(path))
}

pub fn read_neighborhoods_bincode<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<Neighborhood>, DatasetError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    Ok(bincode::deserialize_from(io::BufReader::new(file))?)
}

fn create_buffered_line_reader<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}
