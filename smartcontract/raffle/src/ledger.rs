// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Request ledger: every randomness request in issue order, with its status.
//! Storage sits behind [`RequestLedger`]; the rules live in its provided methods.

use raffle_abi::{ArchivedRequest, RandomWord, RequestId};
use serde::{Deserialize, Serialize};

use crate::error::RaffleError;

/// Status of one randomness request. Absence from the ledger means the id is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub fulfilled: bool,
    pub random_words: Vec<RandomWord>,
}

#[allow(async_fn_in_trait)]
pub trait RequestLedger {
    async fn load(&self, request_id: &RequestId) -> Result<Option<RequestStatus>, RaffleError>;

    fn save(&mut self, request_id: &RequestId, status: RequestStatus) -> Result<(), RaffleError>;

    fn remove(&mut self, request_id: &RequestId) -> Result<(), RaffleError>;

    /// Appends to the issue-order history.
    fn push_history(&mut self, request_id: RequestId);

    /// Drops the oldest history entry.
    fn pop_history(&mut self);

    fn history_len(&self) -> usize;

    /// Page of request ids in issue order.
    async fn request_ids(&self, from: usize, limit: usize) -> Result<Vec<RequestId>, RaffleError>;

    async fn status(&self, request_id: &RequestId) -> Result<RequestStatus, RaffleError> {
        self.load(request_id)
            .await?
            .ok_or_else(|| RaffleError::UnknownRequest(request_id.clone()))
    }

    /// Fails unless `request_id` is known and still pending.
    async fn ensure_pending(&self, request_id: &RequestId) -> Result<(), RaffleError> {
        if self.status(request_id).await?.fulfilled {
            return Err(RaffleError::AlreadyFulfilled(request_id.clone()));
        }
        Ok(())
    }

    /// Records a freshly issued request. The coordinator guarantees unique ids.
    fn record(&mut self, request_id: RequestId) -> Result<(), RaffleError> {
        self.save(&request_id, RequestStatus::default())?;
        self.push_history(request_id);
        Ok(())
    }

    /// The only mutation a request ever sees.
    async fn fulfill(
        &mut self,
        request_id: &RequestId,
        random_words: Vec<RandomWord>,
    ) -> Result<(), RaffleError> {
        self.ensure_pending(request_id).await?;
        self.save(
            request_id,
            RequestStatus {
                fulfilled: true,
                random_words,
            },
        )
    }

    /// Removes the oldest fulfilled requests, keeping at least `keep_last`
    /// entries. Stops at the first pending request and at `retained`, so
    /// issue order is kept and a stalled settlement can still be replayed.
    async fn archive(
        &mut self,
        keep_last: usize,
        retained: Option<&RequestId>,
    ) -> Result<Vec<ArchivedRequest>, RaffleError> {
        let removable = self.history_len().saturating_sub(keep_last);
        let candidates = self.request_ids(0, removable).await?;
        let mut archived = Vec::new();

        for request_id in candidates {
            if retained == Some(&request_id) {
                break;
            }
            let status = self.status(&request_id).await?;
            if !status.fulfilled {
                break;
            }
            self.remove(&request_id)?;
            self.pop_history();
            archived.push(ArchivedRequest {
                request_id,
                random_words: status.random_words,
            });
        }
        Ok(archived)
    }
}

/// Ledger kept in memory, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    statuses: std::collections::BTreeMap<RequestId, RequestStatus>,
    history: std::collections::VecDeque<RequestId>,
}

#[cfg(test)]
impl RequestLedger for MemoryLedger {
    async fn load(&self, request_id: &RequestId) -> Result<Option<RequestStatus>, RaffleError> {
        Ok(self.statuses.get(request_id).cloned())
    }

    fn save(&mut self, request_id: &RequestId, status: RequestStatus) -> Result<(), RaffleError> {
        self.statuses.insert(request_id.clone(), status);
        Ok(())
    }

    fn remove(&mut self, request_id: &RequestId) -> Result<(), RaffleError> {
        self.statuses.remove(request_id);
        Ok(())
    }

    fn push_history(&mut self, request_id: RequestId) {
        self.history.push_back(request_id);
    }

    fn pop_history(&mut self) {
        self.history.pop_front();
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }

    async fn request_ids(&self, from: usize, limit: usize) -> Result<Vec<RequestId>, RaffleError> {
        Ok(self.history.iter().skip(from).take(limit).cloned().collect())
    }
}
