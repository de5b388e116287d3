use crate::{
    messages::{request::RequestData, Request, Response},
    ClientKey, Key,
};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Keeps track of the requests to the key-value store that were not answered yet.
///
/// Requests that stay unanswered for longer than the configured timeout are reported as
/// failed through a synthesized [`Response`] with a [`Timeout`][crate::KvsError::Timeout]
/// error, so that the regular response handling can decide whether to retry them.
#[derive(Debug)]
pub(super) struct KvsClient {
    timeout: Duration,
    pending: HashMap<String, PendingKvsRequest>,
}

#[derive(Debug)]
struct PendingKvsRequest {
    request: Request,
    sent: Instant,
}

impl KvsClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn track(&mut self, request: &Request, sent: Instant) {
        if let Some(request_id) = &request.request_id {
            self.pending.insert(
                request_id.clone(),
                PendingKvsRequest {
                    request: request.clone(),
                    sent,
                },
            );
        }
    }

    pub fn complete(&mut self, response_id: Option<&str>) {
        if let Some(id) = response_id {
            self.pending.remove(id);
        }
    }

    /// Removes all requests that were sent more than `timeout` before `now` and returns
    /// a timeout response for each of them.
    pub fn expire(&mut self, now: Instant) -> Vec<Response> {
        let timeout = self.timeout;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|p| p.request.timeout_response())
            .collect()
    }

    /// Returns `true` if an unanswered GET request includes `key`.
    pub fn is_fetching(&self, key: &ClientKey) -> bool {
        self.pending.values().any(|p| match &p.request.request {
            RequestData::Get { keys } => keys
                .iter()
                .any(|k| matches!(k, Key::Client(client_key) if client_key == key)),
            _ => false,
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
