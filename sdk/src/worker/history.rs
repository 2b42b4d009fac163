//! Decision batches over a paged history
//!
//! A decision task carries the first page of its run's history; the rest is
//! fetched on demand. The cursor walks the events in id order and groups
//! them into the rounds in which workflow code was (or is about to be) run.

use crate::error::{Result, WeftError};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;
use weft_core::{EventAttributes, EventType, HistoryEvent, HistoryPageFetcher};

/// Events of one decision round.
///
/// `events` are the events up to and including the `DecisionTaskStarted`
/// that handed the round to a worker. When that decision task completed,
/// `decision_events` holds the decision-shaped events recorded for it and
/// `completed` is set.
#[derive(Debug, Clone, Default)]
pub(crate) struct DecisionBatch {
    pub events: Vec<HistoryEvent>,
    pub decision_events: Vec<HistoryEvent>,
    pub started_event_id: Option<i64>,
    pub started_timestamp: Option<DateTime<Utc>>,
    pub completed: bool,
    pub binary_checksum: Option<String>,
}

impl DecisionBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.decision_events.is_empty() && !self.completed
    }
}

/// Cursor over a run's history, fetching further pages lazily.
pub(crate) struct HistoryCursor<'a> {
    fetcher: &'a dyn HistoryPageFetcher,
    buffer: VecDeque<HistoryEvent>,
    next_page_token: Option<Vec<u8>>,
    /// Started event id of the task being processed; 0 when unknown
    started_event_id: i64,
    last_event_id: i64,
}

impl<'a> HistoryCursor<'a> {
    /// Create a cursor over `events` that skips everything up to and
    /// including `last_event_id`.
    pub fn new(
        events: Vec<HistoryEvent>,
        next_page_token: Option<Vec<u8>>,
        started_event_id: i64,
        last_event_id: i64,
        fetcher: &'a dyn HistoryPageFetcher,
    ) -> Self {
        Self {
            fetcher,
            buffer: events.into(),
            next_page_token: next_page_token.filter(|token| !token.is_empty()),
            started_event_id,
            last_event_id,
        }
    }

    /// Id of the last event handed out
    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    fn reached_started_event(&self) -> bool {
        self.started_event_id > 0 && self.last_event_id >= self.started_event_id
    }

    async fn fill(&mut self) -> Result<()> {
        while self.buffer.is_empty() && !self.reached_started_event() {
            let Some(token) = self.next_page_token.take() else {
                return Ok(());
            };
            let page = self.fetcher.fetch_next_page(&token).await?;
            debug!(
                events = page.events.len(),
                after_event_id = self.last_event_id,
                "Fetched history page"
            );
            if page.events.is_empty() {
                return Ok(());
            }
            self.next_page_token = page.next_page_token.filter(|token| !token.is_empty());
            self.buffer.extend(page.events);
        }
        Ok(())
    }

    /// Type of the next unprocessed event
    async fn peek_type(&mut self) -> Result<Option<EventType>> {
        loop {
            self.fill().await?;
            let Some(event_id) = self.buffer.front().map(|event| event.event_id) else {
                return Ok(None);
            };
            if event_id <= self.last_event_id {
                self.buffer.pop_front();
                continue;
            }
            if event_id != self.last_event_id + 1 {
                return Err(WeftError::InvalidHistory(format!(
                    "expected event {} but history continues with event {}",
                    self.last_event_id + 1,
                    event_id
                )));
            }
            return Ok(self.buffer.front().map(|event| event.event_type()));
        }
    }

    async fn next_event(&mut self) -> Result<Option<HistoryEvent>> {
        if self.peek_type().await?.is_none() {
            return Ok(None);
        }
        let event = self.buffer.pop_front();
        if let Some(event) = &event {
            self.last_event_id = event.event_id;
        }
        Ok(event)
    }

    /// Next decision round, or `None` once history is exhausted
    pub async fn next_batch(&mut self) -> Result<Option<DecisionBatch>> {
        let mut batch = DecisionBatch::default();

        // A sticky continuation starts with the completion of the previous task
        if self.peek_type().await? == Some(EventType::DecisionTaskCompleted) {
            self.take_decision_round(&mut batch).await?;
            return Ok(Some(batch));
        }

        while let Some(event) = self.next_event().await? {
            if event.event_type() != EventType::DecisionTaskStarted {
                batch.events.push(event);
                continue;
            }

            let (event_id, timestamp) = (event.event_id, event.timestamp);
            batch.events.push(event);
            match self.peek_type().await? {
                // the worker never completed this task, the round goes on
                Some(EventType::DecisionTaskTimedOut) | Some(EventType::DecisionTaskFailed) => {
                    continue
                }
                Some(EventType::DecisionTaskCompleted) => {
                    batch.started_event_id = Some(event_id);
                    batch.started_timestamp = Some(timestamp);
                    self.take_decision_round(&mut batch).await?;
                    return Ok(Some(batch));
                }
                _ => {
                    batch.started_event_id = Some(event_id);
                    batch.started_timestamp = Some(timestamp);
                    return Ok(Some(batch));
                }
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    /// Consume a `DecisionTaskCompleted` and the decision events after it
    async fn take_decision_round(&mut self, batch: &mut DecisionBatch) -> Result<()> {
        if let Some(event) = self.next_event().await? {
            if let EventAttributes::DecisionTaskCompleted {
                binary_checksum, ..
            } = &event.attributes
            {
                if !binary_checksum.is_empty() {
                    batch.binary_checksum = Some(binary_checksum.clone());
                }
            }
        }
        batch.completed = true;

        while let Some(event_type) = self.peek_type().await? {
            if !event_type.is_decision_event() {
                break;
            }
            if let Some(event) = self.next_event().await? {
                batch.decision_events.push(event);
            }
        }
        Ok(())
    }
}
