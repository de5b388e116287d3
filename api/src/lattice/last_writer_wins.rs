//! Provides the [`LastWriterWinsLattice`] and related timestamp types.

use super::Lattice;

/// A lattice where later writes overwrite earlier ones.
///
/// Keeps a [`Timestamp`] for the value. On merge, the value is overwritten only if the
/// timestamp in the other value is newer. Two different values written at the same instant
/// are ordered by the value itself, so every replica picks the same winner.
///
/// The causal cache uses this lattice for the periodic report of the keys it caches; that
/// report is only ever replaced, never combined.
///
/// ## Example
///
/// ```
/// use causal_cache_api::lattice::{
///     Lattice, LastWriterWinsLattice,
///     last_writer_wins::{Timestamp, TimestampValuePair},
/// };
///
/// let mut lattice = LastWriterWinsLattice::from_pair(Timestamp::now(), 42);
/// assert_eq!(lattice.reveal().value(), &42);
///
/// let value_1 = TimestampValuePair::new(Timestamp::now(), 100);
/// let value_2 = TimestampValuePair::new(Timestamp::now(), 50);
/// assert!(value_1.timestamp() <= value_2.timestamp());
///
/// lattice.merge_element(&value_2);
/// assert_eq!(lattice.reveal().value(), &50);
///
/// // `value_1` is older than `value_2`, so it does not replace it
/// lattice.merge_element(&value_1);
/// assert_eq!(lattice.reveal().value(), &50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct LastWriterWinsLattice<T> {
    element: TimestampValuePair<T>,
}

impl<T> LastWriterWinsLattice<T> {
    /// Creates a new lattice from the given value.
    pub fn new(element: TimestampValuePair<T>) -> Self {
        Self { element }
    }

    /// Creates a new lattice from the given value, using the current time as timestamp
    pub fn new_now(value: T) -> Self {
        Self::from_pair(Timestamp::now(), value)
    }

    /// Convenience function to construct a lattice from a timestamp and a value.
    pub fn from_pair(timestamp: Timestamp, value: T) -> Self {
        Self::new(TimestampValuePair::new(timestamp, value))
    }
}

impl<T> Lattice for LastWriterWinsLattice<T>
where
    T: Clone + Ord,
{
    type Element = TimestampValuePair<T>;

    fn reveal(&self) -> &TimestampValuePair<T> {
        &self.element
    }

    fn into_revealed(self) -> TimestampValuePair<T> {
        self.element
    }

    fn assign(&mut self, element: Self::Element) {
        self.element = element;
    }

    fn merge_element(&mut self, element: &TimestampValuePair<T>) {
        let newer = match element.timestamp.cmp(&self.element.timestamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => element.value > self.element.value,
        };
        if newer {
            self.element = element.clone();
        }
    }
}

/// The element type stored in a [`LastWriterWinsLattice`]. Pair of a [`Timestamp`] and a value.
#[derive(Debug, PartialEq, Eq, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimestampValuePair<T> {
    timestamp: Timestamp,
    value: T,
}

impl<T> TimestampValuePair<T> {
    /// Constructs a new pair from the given timestamp and value.
    pub fn new(timestamp: Timestamp, value: T) -> Self {
        Self { timestamp, value }
    }

    /// Returns the stored timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns a reference to the wrapped value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the wrapped value, taking ownership.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// The UTC timestamp used for keeping track of value creation times.
///
/// Depends on the system time reported by the operating system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Timestamp(chrono::DateTime<chrono::Utc>);

impl Timestamp {
    /// Returns an UTC timestamp corresponding to the current date and time.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }
}
