use crate::{
    lattice::{causal::VectorClock, Lattice, MapLattice, SetLattice},
    ClientKey,
};

/// The value type held by the causal cache: a set of strings with a vector clock and the
/// versions of the keys it causally depends on.
pub type CausalLattice = MultiKeyCausalLattice<SetLattice<String>>;

/// Provides [causal consistency](https://en.wikipedia.org/wiki/Causal_consistency) across
/// keys by carrying the dependency versions of a value.
///
/// Each value records its own [`VectorClock`] and, for every key it causally depends on, the
/// vector clock of the dependency version that was observed when the value was written. A
/// reader may only expose the value once all of those dependency versions are visible too.
///
/// Merging is componentwise: the clocks are merged pointwise, the dependency maps are
/// unioned (merging the clocks of keys present in both), and the payloads are merged with
/// their own [`Lattice`] implementation. No version or dependency information is lost when
/// the same value arrives several times or out of order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MultiKeyCausalLattice<T> {
    element: MultiKeyCausalPayload<T>,
}

impl<T> MultiKeyCausalLattice<T> {
    /// Constructs a new lattice with the given payload.
    pub fn new(element: MultiKeyCausalPayload<T>) -> Self {
        Self { element }
    }

    /// The version of this value.
    pub fn vector_clock(&self) -> &VectorClock {
        &self.element.vector_clock
    }

    /// The dependency versions of this value, keyed by dependency key.
    pub fn dependencies(&self) -> &MapLattice<ClientKey, VectorClock> {
        &self.element.dependencies
    }

    /// The wrapped payload.
    pub fn value(&self) -> &T {
        &self.element.value
    }
}

impl CausalLattice {
    /// Convenience constructor for the cache's value type.
    pub fn from_parts<'a>(
        vector_clock: VectorClock,
        dependencies: impl IntoIterator<Item = (ClientKey, VectorClock)>,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut deps = MapLattice::default();
        for (key, clock) in dependencies {
            deps.insert(key, clock);
        }
        Self::new(MultiKeyCausalPayload::new(
            vector_clock,
            deps,
            values.into_iter().map(str::to_owned).collect(),
        ))
    }
}

impl<T> Lattice for MultiKeyCausalLattice<T>
where
    T: Lattice + Clone,
{
    type Element = MultiKeyCausalPayload<T>;

    fn reveal(&self) -> &MultiKeyCausalPayload<T> {
        &self.element
    }

    fn into_revealed(self) -> MultiKeyCausalPayload<T> {
        self.element
    }

    fn assign(&mut self, element: Self::Element) {
        self.element = element;
    }

    fn merge_element(&mut self, other: &MultiKeyCausalPayload<T>) {
        self.element.vector_clock.merge(&other.vector_clock);
        self.element.dependencies.merge(&other.dependencies);
        self.element.value.merge(&other.value);
    }
}

/// A value that can be stored in a [`MultiKeyCausalLattice`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[allow(missing_docs)]
pub struct MultiKeyCausalPayload<T> {
    pub vector_clock: VectorClock,
    pub dependencies: MapLattice<ClientKey, VectorClock>,
    pub value: T,
}

impl<T> MultiKeyCausalPayload<T> {
    /// Constructs a new payload from the given values.
    pub fn new(
        vector_clock: VectorClock,
        dependencies: MapLattice<ClientKey, VectorClock>,
        value: T,
    ) -> Self {
        Self {
            vector_clock,
            dependencies,
            value,
        }
    }
}
