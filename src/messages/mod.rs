//! Defines the message types that are exchanged between clients, cache threads, and the
//! key-value store.

pub use self::{
    causal::{CausalRequest, CausalResponse, CausalTuple, ConsistencyType, KeyVersion},
    request::Request,
    response::Response,
};

pub mod causal;
pub mod request;
pub mod response;

/// The address at which a client or cache thread receives messages.
///
/// Formatted as a socket address, e.g. `127.0.0.1:7000`.
pub type Address = String;

/// The message type that is sent over TCP.
///
/// All messages are framed by [`send_tcp_message`][crate::nodes::send_tcp_message].
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TcpMessage {
    /// A read request of a client, or of a peer cache thread that needs versions that this
    /// thread has in its causal cut.
    CausalGet(CausalRequest),
    /// A write request of a client.
    CausalPut(CausalRequest),
    /// The answer to a [`TcpMessage::CausalGet`] or [`TcpMessage::CausalPut`].
    ///
    /// Cache threads only receive this variant from peer cache threads that answer a
    /// remote read.
    CausalResponse(CausalResponse),
    /// A request to the key-value store.
    KvsRequest(Request),
    /// A reply of the key-value store.
    KvsResponse(Response),
}
