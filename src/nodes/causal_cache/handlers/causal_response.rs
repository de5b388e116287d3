use crate::{messages::CausalResponse, nodes::causal_cache::CausalCacheNode};

impl CausalCacheNode {
    /// Handles the response of a peer cache thread to a remote read.
    ///
    /// The response `id` is the ID of the client whose requests issued the remote read.
    pub fn causal_response_handler(&mut self, response: CausalResponse) {
        let requests = match self.remote_readers.get(&response.id) {
            Some(requests) => requests.clone(),
            None => {
                log::warn!(
                    "Received a causal response for client {} without pending remote reads",
                    response.id
                );
                return;
            }
        };

        for request in requests {
            let mut is_complete = false;
            if let Some(pending) = self.pending_multi.get_mut(&request) {
                for tuple in &response.tuples {
                    let value = tuple.payload.clone().unwrap_or_default();
                    if pending.receive_remote(&tuple.key, value) {
                        is_complete = true;
                    }
                }
            }
            if is_complete {
                self.respond_multi(&request);
            }
        }

        self.drain_continuations();
    }
}
