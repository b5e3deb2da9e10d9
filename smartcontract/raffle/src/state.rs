// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use linera_sdk::views::{
    linera_views, LogView, MapView, QueueView, RegisterView, RootView, ViewError,
    ViewStorageContext,
};
use raffle::{ledger::RequestStatus, round::RoundState, RaffleEvent, RequestId};

/// The application state for the Raffle.
#[derive(RootView)]
#[view(context = ViewStorageContext)]
pub struct RaffleState {
    /// The round and its configuration
    pub round: RegisterView<RoundState>,
    /// Status of every randomness request still in the ledger
    pub request_statuses: MapView<RequestId, RequestStatus>,
    /// Request ids in issue order; archival pops from the front
    pub request_history: QueueView<RequestId>,
    /// Audit trail of requests, fulfillments and settlements
    pub events: LogView<RaffleEvent>,
}

#[allow(dead_code)]
impl RaffleState {
    pub fn record_events(&mut self, events: Vec<RaffleEvent>) {
        for event in events {
            self.events.push(event);
        }
    }

    /// Page of the event log, oldest first
    pub async fn get_events(&self, from: usize, limit: usize) -> Result<Vec<RaffleEvent>, String> {
        let end = from.saturating_add(limit).min(self.events.count());
        if from >= end {
            return Ok(Vec::new());
        }
        self.events.read(from..end).await
            .map_err(|e: ViewError| format!("Failed to read events: {:?}", e))
    }

    pub async fn get_request_status(&self, request_id: &RequestId) -> Result<Option<RequestStatus>, String> {
        self.request_statuses.get(request_id).await
            .map_err(|e| format!("Failed to read request {}: {:?}", request_id, e))
    }

    /// Page of request ids in issue order
    pub async fn get_request_ids(&self, from: usize, limit: usize) -> Result<Vec<RequestId>, String> {
        let ids = self.request_history.read_front(from.saturating_add(limit)).await
            .map_err(|e| format!("Failed to read request history: {:?}", e))?;
        Ok(ids.into_iter().skip(from).collect())
    }
}
