use super::Lattice;
use std::ops;

/// [`Lattice`] implementation that merges elements by taking their maximum.
///
/// Vector clocks store one `MaxLattice` counter per writer, so merging two clocks is the
/// pointwise maximum of their counters.
///
/// ```
/// use causal_cache_api::lattice::{Lattice, MaxLattice};
///
/// let mut counter = MaxLattice::new(4usize);
/// counter.merge_element(&6);
/// counter.merge_element(&5);
/// assert_eq!(counter.reveal(), &6);
///
/// counter += 1;
/// assert_eq!(counter.into_revealed(), 7);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MaxLattice<T> {
    element: T,
}

impl<T: Ord> MaxLattice<T> {
    /// Constructs a new lattice from the given value.
    pub fn new(element: T) -> Self {
        Self { element }
    }
}

impl<T: Ord + Clone> Lattice for MaxLattice<T> {
    type Element = T;

    fn reveal(&self) -> &T {
        &self.element
    }

    fn into_revealed(self) -> T {
        self.element
    }

    fn merge_element(&mut self, element: &T) {
        if &self.element < element {
            self.element = element.clone();
        }
    }

    fn assign(&mut self, element: Self::Element) {
        self.element = element;
    }
}

impl<T: ops::AddAssign> ops::AddAssign<T> for MaxLattice<T> {
    fn add_assign(&mut self, rhs: T) {
        self.element += rhs;
    }
}
