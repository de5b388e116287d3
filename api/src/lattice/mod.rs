//! Contains the [`Lattice`] trait and its implementations.
//!
//! The following base lattices are available:
//!
//! - **[`MaxLattice`]:** Defines the merge operation as the maximum of the two values.
//! - **[`SetLattice`]:** A set of items that uses the union operator for merging.
//! - **[`LastWriterWinsLattice`]:** Keeps track of the creation time of each value and chooses
//!     the newer value on merging.
//!
//! There are also compound lattices that can wrap other lattice values:
//!
//! - **[`MapLattice`]:** A hash map that stores lattice types. When merging two maps,
//!     conflicting values are resolved by applying their merge operator.
//!
//! The [`causal`] submodule combines these into the vector clocks and the multi-key causal
//! values that the causal cache reasons about.

pub use self::{
    last_writer_wins::LastWriterWinsLattice, map::MapLattice, max::MaxLattice, set::SetLattice,
};

pub mod causal;
pub mod last_writer_wins;

mod map;
mod max;
mod set;

/// Abstraction for a [_bounded join semilattice_](https://en.wikipedia.org/wiki/Semilattice).
///
/// A join semilattice is a set that has an unique supremum (least upper bound) operator `⊔`
/// for all pairs of values. The `⊔` operator must be
/// [commutative](https://en.wikipedia.org/wiki/Commutative),
/// [associative](https://en.wikipedia.org/wiki/Associative_property), and
/// [idempotent](https://en.wikipedia.org/wiki/Idempotence).
///
/// The causal cache relies on these properties when values for the same key arrive more
/// than once or out of order: fetch retries, duplicate store responses, and concurrent
/// resolutions all end in the same merged state.
///
/// **All implementations must fulfill all the join semilattice properties.** Instead of
/// implementing this trait for new types, it is often possible to compose the existing types
/// that implement `Lattice` into more complex types.
pub trait Lattice {
    /// The type that is stored in this lattice.
    type Element;

    /// Returns the current value stored in the lattice.
    fn reveal(&self) -> &Self::Element;

    /// Returns the current value stored in the lattice, taking ownership.
    fn into_revealed(self) -> Self::Element;

    /// Assigns a new value to the lattice without any merging.
    fn assign(&mut self, element: Self::Element);

    /// Updates the lattice value with the supremum of the current and given values.
    ///
    /// This implements the supremum operator `⊔` described above.
    fn merge_element(&mut self, element: &Self::Element);

    /// Updates the lattice value with the supremum of the current and given values.
    ///
    /// This is a convenience method that reveals the value of `other` and then calls the
    /// [`merge_element`][Self::merge_element] method.
    fn merge(&mut self, other: &Self) {
        self.merge_element(other.reveal());
    }
}
