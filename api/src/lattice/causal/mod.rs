//! Vector clocks and the multi-key causal lattice that the causal cache operates on.

pub use self::multi_key_causal::{CausalLattice, MultiKeyCausalLattice, MultiKeyCausalPayload};
use super::{Lattice, MapLattice, MaxLattice};
use std::{
    cmp::Ordering,
    collections::HashMap,
    hash::{Hash, Hasher},
};

mod multi_key_causal;

/// The result of comparing two [`VectorClock`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CausalOrder {
    /// Every entry of the left clock is `<=` the right one and at least one is smaller.
    Less,
    /// Every entry of the left clock is `>=` the right one and at least one is larger.
    Greater,
    /// Both clocks have the same value for every writer.
    Equal,
    /// Neither clock dominates the other.
    Concurrent,
}

/// A [vector clock](https://en.wikipedia.org/wiki/Vector_clock) allows to determine the partial
/// ordering of events in a distributed system.
///
/// The logical clock of each writer is stored in a [`MaxLattice`], so merging two clocks
/// takes the pointwise maximum. Writers that are missing from the map have an implicit counter
/// of 0; equality and hashing follow that rule, so `{}` and `{a: 0}` are the same clock.
///
/// ```
/// use causal_cache_api::lattice::causal::{CausalOrder, VectorClock};
///
/// let a = VectorClock::from_pairs([("a", 1)]);
/// let b = VectorClock::from_pairs([("a", 2)]);
/// let c = VectorClock::from_pairs([("b", 1)]);
///
/// assert_eq!(a.compare(&b), CausalOrder::Less);
/// assert_eq!(b.compare(&c), CausalOrder::Concurrent);
/// assert!(b.dominates(&a));
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct VectorClock(MapLattice<String, MaxLattice<usize>>);

impl VectorClock {
    /// Creates a clock from `(writer id, counter)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut clock = Self::default();
        for (id, counter) in pairs {
            clock.0.insert(id.into(), MaxLattice::new(counter));
        }
        clock
    }

    /// Returns the counter of the given writer, or 0 if the writer is unknown.
    pub fn get(&self, id: &str) -> usize {
        self.0.get(id).map(|c| *c.reveal()).unwrap_or(0)
    }

    /// Advances the counter of the given writer by one.
    pub fn increment(&mut self, id: impl Into<String>) {
        let id = id.into();
        let next = self.get(&id) + 1;
        self.0.insert(id, MaxLattice::new(next));
    }

    /// Iterates over the `(writer id, counter)` pairs with a non-zero counter.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.0
            .iter()
            .map(|(id, counter)| (id.as_str(), *counter.reveal()))
            .filter(|&(_, counter)| counter > 0)
    }

    /// Returns `true` if every counter of this clock is 0.
    pub fn is_zero(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Compares the two clocks according to the vector clock partial order.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut less = false;
        let mut greater = false;

        let ids = self.0.reveal().keys().chain(other.0.reveal().keys());
        for id in ids {
            match self.get(id).cmp(&other.get(id)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return CausalOrder::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Less,
            (false, true) => CausalOrder::Greater,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Returns `true` if `self >= other`, i.e. `self` causally includes `other`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        matches!(
            self.compare(other),
            CausalOrder::Greater | CausalOrder::Equal
        )
    }

    fn sorted_entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable();
        entries
    }
}

impl Lattice for VectorClock {
    type Element = HashMap<String, MaxLattice<usize>>;

    fn reveal(&self) -> &Self::Element {
        self.0.reveal()
    }

    fn into_revealed(self) -> Self::Element {
        self.0.into_revealed()
    }

    fn assign(&mut self, element: Self::Element) {
        self.0.assign(element);
    }

    fn merge_element(&mut self, element: &Self::Element) {
        self.0.merge_element(element);
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for VectorClock {}

impl Hash for VectorClock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted_entries().hash(state);
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            CausalOrder::Less => Some(Ordering::Less),
            CausalOrder::Greater => Some(Ordering::Greater),
            CausalOrder::Equal => Some(Ordering::Equal),
            CausalOrder::Concurrent => None,
        }
    }
}
