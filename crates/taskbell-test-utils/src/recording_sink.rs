// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use taskbell_core::{DeliveryReceipt, Message, NotificationError, NotificationSink};

use crate::MockFailure;
use crate::journal::Journal;

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    failures: VecDeque<MockFailure>,
}

/// Sink that captures dispatched messages and fails on demand.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<State>,
    journal: Option<Journal>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `dispatch:<content>` into `journal` for each success.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            state: Mutex::default(),
            journal: Some(journal),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next(&self, times: usize, failure: MockFailure) {
        self.state()
            .failures
            .extend(std::iter::repeat_n(failure, times));
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn count(&self) -> usize {
        self.state().messages.len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn dispatch(&self, message: Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        let mut state = self.state();
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.to_error("recording-sink"));
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("dispatch:{}", message.payload.content));
        }
        let receipt = DeliveryReceipt {
            message_id: message.id.clone(),
            channel_id: "recording-sink".to_string(),
            external_id: None,
            latency_ms: 0.0,
            delivered_at: Utc::now(),
        };
        state.messages.push(message);
        Ok(vec![receipt])
    }
}
