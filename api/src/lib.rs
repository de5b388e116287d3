#![warn(missing_docs)]

//! Value types shared between causal cache nodes, their clients, and the underlying
//! lattice key-value store.
//!
//! The [`lattice`] module contains the merge-able data types. Values exchanged with the
//! key-value store are wrapped in the [`LatticeValue`] enum.

use eyre::anyhow;
use lattice::{causal::CausalLattice, LastWriterWinsLattice};
use std::{error::Error, fmt::Display, sync::Arc};

use crate::lattice::Lattice;

pub mod lattice;

/// A string-based key type used to store user-supplied data.
///
/// We use an [`Arc`]-wrapped [`String`] because keys get cloned into many of the cache's
/// bookkeeping maps. For bare strings, this would require a reallocation, but with the `Arc`
/// wrapper only the reference counter is incremented.
#[derive(
    Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, serde::Serialize, serde::Deserialize,
)]
pub struct ClientKey(Arc<String>);

impl std::ops::Deref for ClientKey {
    type Target = Arc<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Arc<String>> for ClientKey {
    fn from(k: Arc<String>) -> Self {
        Self(k)
    }
}

impl From<String> for ClientKey {
    fn from(k: String) -> Self {
        Self::from(Arc::new(k))
    }
}

impl From<&str> for ClientKey {
    fn from(k: &str) -> Self {
        Self::from(k.to_owned())
    }
}

/// Describes a value stored in the key value store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LatticeValue {
    /// Last-writer wins lattice
    Lww(LastWriterWinsLattice<Vec<u8>>),
    /// Multi-key causal lattice with a set-of-strings payload
    MultiCausal(CausalLattice),
}

impl LatticeValue {
    /// Tries to cast the value to an [`LastWriterWinsLattice`].
    ///
    /// Errors if the value is of a different type.
    pub fn as_lww(&self) -> eyre::Result<&LastWriterWinsLattice<Vec<u8>>> {
        match self {
            Self::Lww(val) => Ok(val),
            other => Err(anyhow!("expected Lww lattice, got `{:?}`", other)),
        }
    }

    /// Tries to cast the value to a [`CausalLattice`].
    ///
    /// Errors if the value is of a different type.
    pub fn as_multi_causal(&self) -> eyre::Result<&CausalLattice> {
        match self {
            Self::MultiCausal(val) => Ok(val),
            other => Err(anyhow!("expected MultiCausal lattice, got `{:?}`", other)),
        }
    }

    /// Tries to cast the value to a [`CausalLattice`], taking ownership.
    ///
    /// Errors if the value is of a different type.
    pub fn into_multi_causal(self) -> eyre::Result<CausalLattice> {
        match self {
            Self::MultiCausal(val) => Ok(val),
            other => Err(anyhow!("expected MultiCausal lattice, got `{:?}`", other)),
        }
    }

    /// Merges the given value into `self` if both values are of the same lattice type.
    ///
    /// If the given value is of a different lattice type than `self`, a
    /// [`KvsError::Lattice`] is returned.
    pub fn try_merge(&mut self, other: &LatticeValue) -> Result<(), KvsError> {
        match (self, other) {
            (LatticeValue::Lww(s), LatticeValue::Lww(other)) => {
                s.merge(other);
                Ok(())
            }
            (LatticeValue::MultiCausal(s), LatticeValue::MultiCausal(other)) => {
                s.merge(other);
                Ok(())
            }
            _ => Err(KvsError::Lattice),
        }
    }

    /// Returns the lattice type of the value.
    pub fn ty(&self) -> LatticeType {
        match self {
            LatticeValue::Lww(_) => LatticeType::Lww,
            LatticeValue::MultiCausal(_) => LatticeType::MultiCausal,
        }
    }
}

impl From<CausalLattice> for LatticeValue {
    fn from(v: CausalLattice) -> Self {
        Self::MultiCausal(v)
    }
}

impl From<LastWriterWinsLattice<Vec<u8>>> for LatticeValue {
    fn from(val: LastWriterWinsLattice<Vec<u8>>) -> Self {
        Self::Lww(val)
    }
}

/// Defines the lattice types that the key-value store knows about.
///
/// The cache itself only writes [`LatticeType::MultiCausal`] and [`LatticeType::Lww`]
/// values, but the store reports the declared type of every key in its responses.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum LatticeType {
    /// Last-writer wins lattice
    Lww,
    /// Unordered set lattice
    Set,
    /// Single-key causal lattice
    SingleCausal,
    /// Multi-key causal lattice
    MultiCausal,
    /// Ordered-set lattice
    OrderedSet,
}

/// Used to signal errors in messages exchanged with the key-value store.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum KvsError {
    /// The requested key does not exist.
    KeyDoesNotExist,
    /// The request timed out.
    Timeout,
    /// The lattice type was not correctly specified or conflicted with an
    /// existing key.
    Lattice,
    /// Failed to serialize a message.
    Serialize,
}

impl Display for KvsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyDoesNotExist => write!(f, "The requested key does not exist."),
            Self::Timeout => write!(f, "The request timed out."),
            Self::Lattice => write!(
                f,
                "The lattice type was not correctly specified or conflicted with an existing key."
            ),
            Self::Serialize => write!(f, "Serialization error."),
        }
    }
}

impl Error for KvsError {}

impl From<serde_json::Error> for KvsError {
    fn from(_: serde_json::Error) -> Self {
        Self::Serialize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{causal::VectorClock, last_writer_wins::Timestamp};
    use pretty_assertions::assert_eq;

    #[test]
    fn try_merge_rejects_mismatched_types() {
        let mut lww = LatticeValue::Lww(LastWriterWinsLattice::from_pair(
            Timestamp::now(),
            b"v".to_vec(),
        ));
        let causal = LatticeValue::MultiCausal(CausalLattice::default());

        assert_eq!(lww.try_merge(&causal), Err(KvsError::Lattice));
        assert_eq!(lww.ty(), LatticeType::Lww);
        assert_eq!(causal.ty(), LatticeType::MultiCausal);
    }

    #[test]
    fn try_merge_causal_values() {
        let mut a = LatticeValue::from(CausalLattice::from_parts(
            VectorClock::from_pairs([("a", 1)]),
            [],
            ["x"],
        ));
        let b = LatticeValue::from(CausalLattice::from_parts(
            VectorClock::from_pairs([("b", 1)]),
            [],
            ["y"],
        ));
        a.try_merge(&b).unwrap();

        let merged = a.into_multi_causal().unwrap();
        assert_eq!(
            merged.vector_clock(),
            &VectorClock::from_pairs([("a", 1), ("b", 1)])
        );
        assert_eq!(merged.value().len(), 2);
    }
}
