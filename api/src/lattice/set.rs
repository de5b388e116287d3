use super::Lattice;
use std::{
    collections::{hash_set, HashSet},
    hash::Hash,
};

/// Lattice implementation based on a [`HashSet`] with the
/// [union operation](https://en.wikipedia.org/wiki/Union_(set_theory)) as merge operator.
///
/// This is the payload type of the values held by the causal cache: concurrent writes to a
/// key keep all written strings instead of picking one.
///
/// ## Example
///
/// ```
/// use causal_cache_api::lattice::{Lattice, SetLattice};
/// use std::collections::HashSet;
///
/// let mut lattice: SetLattice<_> = ["foo", "bar"].iter().copied().collect();
/// lattice.merge_element(&["bar", "baz"].iter().copied().collect());
///
/// let expected: HashSet<_> = ["foo", "bar", "baz"].iter().copied().collect();
/// assert_eq!(lattice.reveal(), &expected);
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SetLattice<T> {
    #[serde(bound = "T: Hash + Eq + serde::Serialize + for<'a> serde::Deserialize<'a>")]
    element: HashSet<T>,
}

impl<T> SetLattice<T>
where
    T: Eq + Hash,
{
    /// Creates a new lattice based on the given set.
    pub fn new(element: HashSet<T>) -> Self {
        Self { element }
    }

    /// Inserts the given value into the set.
    pub fn insert(&mut self, element: T) {
        self.element.insert(element);
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.element.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.element.is_empty()
    }

    /// An iterator visiting all elements in arbitrary order.
    pub fn iter(&self) -> hash_set::Iter<'_, T> {
        self.element.iter()
    }
}

impl<T> Lattice for SetLattice<T>
where
    T: Eq + Hash + Clone,
{
    type Element = HashSet<T>;

    fn reveal(&self) -> &HashSet<T> {
        &self.element
    }

    fn into_revealed(self) -> HashSet<T> {
        self.element
    }

    fn merge_element(&mut self, element: &HashSet<T>) {
        for val in element {
            if !self.element.contains(val) {
                self.element.insert(val.clone());
            }
        }
    }

    fn assign(&mut self, element: Self::Element) {
        self.element = element;
    }
}

impl<T> Default for SetLattice<T> {
    fn default() -> Self {
        Self {
            element: Default::default(),
        }
    }
}

impl<T> FromIterator<T> for SetLattice<T>
where
    T: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> PartialEq for SetLattice<T>
where
    HashSet<T>: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl<T> Eq for SetLattice<T> where HashSet<T>: Eq {}
