/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Node and edge id allocation.
//!
//! Ids are minted by the host's monotonic counter; the panel obtains them
//! through a `request-for-ids`/`response-for-ids` round trip keyed by a
//! request number. `RemoteIdSource` runs that round trip over channels;
//! `LocalIdSource` is the standalone fallback that mints ids directly.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// Default time to wait for the host to answer an id request.
pub const DEFAULT_ID_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The host did not answer within the timeout. Recoverable: the caller
    /// aborts the initiating operation and surfaces a warning.
    Timeout,
    /// The transport to the host is gone.
    Disconnected,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::Timeout => write!(f, "Timed out waiting for ids from the host"),
            IdError::Disconnected => write!(f, "Id channel to the host is disconnected"),
        }
    }
}

/// An outbound `request-for-ids` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
    pub key: u64,
    pub n: usize,
}

/// An inbound `response-for-ids` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResponse {
    pub key: u64,
    pub ids: Vec<NodeId>,
}

/// Source of fresh node/edge ids for the mutation operations.
pub trait IdSource {
    /// Mint `n` fresh ids. May suspend the initiating operation while the
    /// host answers.
    fn alloc(&mut self, n: usize) -> Result<Vec<NodeId>, IdError>;

    /// Feed a `response-for-ids` message back into the source. Sources that
    /// never issue requests drop it as stale.
    fn deliver(&mut self, response: IdResponse) {
        warn!("Dropping stale id response for key {}", response.key);
    }
}

/// Monotonic counter source for standalone use and the host side itself.
#[derive(Debug, Default)]
pub struct LocalIdSource {
    next: u64,
}

impl LocalIdSource {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// The next id that would be minted. Persistence uses this to keep the
    /// counter ahead of every id already in a document.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl IdSource for LocalIdSource {
    fn alloc(&mut self, n: usize) -> Result<Vec<NodeId>, IdError> {
        let ids = (0..n)
            .map(|_| {
                let id = self.next.to_string();
                self.next += 1;
                id
            })
            .collect();
        Ok(ids)
    }
}

/// Channel-backed source running the id round trip against the host.
///
/// Each `alloc` sends one keyed request and waits for the matching response.
/// Responses carrying an older key are answers to a request whose initiator
/// already timed out; they are logged and dropped.
pub struct RemoteIdSource {
    requests: Sender<IdRequest>,
    response_tx: Sender<IdResponse>,
    response_rx: Receiver<IdResponse>,
    next_key: u64,
    timeout: Duration,
}

impl RemoteIdSource {
    pub fn new(requests: Sender<IdRequest>, timeout: Duration) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            requests,
            response_tx,
            response_rx,
            next_key: 0,
            timeout,
        }
    }

    /// Sender half for the transport to push `response-for-ids` messages
    /// into, from whichever thread runs the channel.
    pub fn response_sender(&self) -> Sender<IdResponse> {
        self.response_tx.clone()
    }
}

impl IdSource for RemoteIdSource {
    fn alloc(&mut self, n: usize) -> Result<Vec<NodeId>, IdError> {
        let key = self.next_key;
        self.next_key += 1;
        self.requests
            .send(IdRequest { key, n })
            .map_err(|_| IdError::Disconnected)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(IdError::Timeout);
            }
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) if response.key == key => return Ok(response.ids),
                Ok(response) => {
                    warn!(
                        "Dropping stale id response for key {} (waiting on {key})",
                        response.key
                    );
                },
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    return Err(IdError::Timeout);
                },
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    return Err(IdError::Disconnected);
                },
            }
        }
    }

    fn deliver(&mut self, response: IdResponse) {
        // Requeued onto our own receiver; alloc picks it up or drops it as
        // stale by key.
        if self.response_tx.send(response).is_err() {
            warn!("Id response channel closed");
        }
    }
}
