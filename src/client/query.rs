//! Results of the list and name queries.

use crate::rpc::{ListReply, PlaceNameReply};
use crate::status::{GeofenceResult, StatusCode};

/// Single-pass sequence of query records.
///
/// Each query produces a fresh sequence; once consumed it cannot be restarted.
#[derive(Debug)]
pub struct Records<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for Records<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Records<T> {}

/// Outcome of `get_geofences` / `get_places`.
///
/// `records() == None` (absent) is distinct from an empty sequence.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub count: i32,
    pub error_code: StatusCode,
    records: Option<Records<T>>,
}

impl<T> QueryResult<T> {
    /// The records, if the server sent any sequence at all.
    pub fn records(&mut self) -> Option<&mut Records<T>> {
        self.records.as_mut()
    }

    pub fn into_records(self) -> Option<Records<T>> {
        self.records
    }

    pub fn has_records(&self) -> bool {
        self.records.is_some()
    }

    /// The server-supplied error code as a `Result`.
    pub fn status(&self) -> GeofenceResult<()> {
        self.error_code.into_result()
    }
}

impl<T> From<ListReply<T>> for QueryResult<T> {
    fn from(reply: ListReply<T>) -> Self {
        Self {
            count: reply.count,
            error_code: reply.error_code,
            records: reply.records.map(|records| Records {
                inner: records.into_iter(),
            }),
        }
    }
}

/// Outcome of `get_place_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceName {
    pub error_code: StatusCode,
    /// Absent is distinct from the empty string.
    pub name: Option<String>,
}

impl From<PlaceNameReply> for PlaceName {
    fn from(reply: PlaceNameReply) -> Self {
        Self {
            error_code: reply.error_code,
            name: reply.place_name,
        }
    }
}
