//! Provides the [`Request`] struct that cache threads send to the key-value store.

use super::{
    response::{Response, ResponseTuple, ResponseType},
    Address,
};
use crate::{Key, KvsError, LatticeType, LatticeValue};

/// An individual GET or PUT request to the key-value store; each request can batch
/// multiple keys.
///
/// The store responds with a [`Response`][super::Response].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Request {
    /// A client-specific ID used to match asynchronous requests with responses.
    pub request_id: Option<String>,
    /// The address at which the sender is waiting for the store's response.
    pub response_address: Option<Address>,
    /// The type and data of this request.
    pub request: RequestData,
}

impl Request {
    /// Constructs the [`Response`] that reports this request as timed out.
    ///
    /// The response carries one tuple per key. For PUT requests, the tuples contain the
    /// value that should have been written, so that the request can be retried from the
    /// response alone.
    pub fn timeout_response(&self) -> Response {
        Response {
            response_id: self.request_id.clone(),
            ty: self.request.ty(),
            error: Err(KvsError::Timeout),
            tuples: match &self.request {
                RequestData::Get { keys } => keys
                    .iter()
                    .map(|key| ResponseTuple {
                        key: key.clone(),
                        lattice: None,
                        lattice_type: None,
                        error: None,
                    })
                    .collect(),
                RequestData::Put { tuples } => tuples
                    .iter()
                    .map(|t| ResponseTuple {
                        key: t.key.clone(),
                        lattice: Some(t.value.clone()),
                        lattice_type: Some(t.lattice_type),
                        error: None,
                    })
                    .collect(),
            },
        }
    }
}

/// Specifies the request type and associated data.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RequestData {
    /// Request the stored values for a set of keys.
    Get {
        /// The list of keys that we want to get the values for.
        keys: Vec<Key>,
    },
    /// Performs the given updates in the key value store.
    Put {
        /// A list of updates batched in this request.
        tuples: Vec<PutTuple>,
    },
}

impl RequestData {
    /// Returns the suitable [`ResponseType`] for this request.
    pub fn ty(&self) -> ResponseType {
        match self {
            RequestData::Get { .. } => ResponseType::Get,
            RequestData::Put { .. } => ResponseType::Put,
        }
    }
}

/// Describes an assign operation on a specific key.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PutTuple {
    /// The key that should be updated.
    pub key: Key,
    /// The new value that should be merged into the current one.
    pub value: LatticeValue,
    /// The declared lattice type of the key.
    pub lattice_type: LatticeType,
}

impl PutTuple {
    /// Creates a tuple whose declared lattice type matches the given value.
    pub fn new(key: Key, value: LatticeValue) -> Self {
        Self {
            key,
            lattice_type: value.ty(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lattice::causal::CausalLattice, ClientKey};
    use pretty_assertions::assert_eq;

    #[test]
    fn put_timeout_keeps_payload() {
        let key: Key = ClientKey::from("k").into();
        let value = LatticeValue::MultiCausal(CausalLattice::default());
        let request = Request {
            request_id: Some("r1".into()),
            response_address: None,
            request: RequestData::Put {
                tuples: vec![PutTuple::new(key.clone(), value.clone())],
            },
        };

        let response = request.timeout_response();
        assert_eq!(response.response_id.as_deref(), Some("r1"));
        assert_eq!(response.ty, ResponseType::Put);
        assert_eq!(response.error, Err(KvsError::Timeout));
        assert_eq!(response.tuples[0].key, key);
        assert_eq!(response.tuples[0].lattice, Some(value));
        assert_eq!(response.tuples[0].lattice_type, Some(LatticeType::MultiCausal));
    }
}
