// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of destination streams.
//!
//! Streams are provisioned on the remote service the first time they are
//! used. Creation is idempotent: an "already exists" answer counts as
//! success, every other error is returned to the caller. Concurrent callers
//! for the same stream share one creation attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as TokioMutex, OnceCell};
use tracing::debug;

use crate::api::LogsApi;
use crate::error::{ApiError, ShipperError};

/// Per-stream state shared by the stream's worker and the registry.
#[derive(Debug)]
pub struct StreamState {
    name: String,
    provisioned: OnceCell<()>,
    /// Token for the next submission; `None` until the service returns one.
    ///
    /// Held for the whole duration of a submission, so two submissions to
    /// the same stream never interleave.
    sequence_token: TokioMutex<Option<String>>,
}

impl StreamState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            provisioned: OnceCell::new(),
            sequence_token: TokioMutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.provisioned.initialized()
    }

    /// Current sequence token of the stream.
    pub async fn sequence_token(&self) -> Option<String> {
        self.sequence_token.lock().await.clone()
    }

    pub(crate) fn token_slot(&self) -> &TokioMutex<Option<String>> {
        &self.sequence_token
    }
}

/// Known streams of one log group.
pub struct StreamRegistry {
    client: Arc<dyn LogsApi>,
    log_group: String,
    streams: Mutex<HashMap<String, Arc<StreamState>>>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(client: Arc<dyn LogsApi>, log_group: impl Into<String>) -> Self {
        Self {
            client,
            log_group: log_group.into(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    /// Creates the log group, tolerating an existing one.
    pub async fn ensure_group(&self) -> Result<(), ShipperError> {
        idempotent_create(self.client.create_log_group(&self.log_group).await)?;
        debug!("SHIPPER | Log group {} ready", self.log_group);
        Ok(())
    }

    /// Returns the state of `name`, provisioning the remote stream on first use.
    ///
    /// A failed creation is not remembered; the next call tries again.
    pub async fn ensure_stream(&self, name: &str) -> Result<Arc<StreamState>, ShipperError> {
        let state = self.state(name);
        state
            .provisioned
            .get_or_try_init(|| async {
                idempotent_create(self.client.create_log_stream(&self.log_group, name).await)?;
                debug!("SHIPPER | Log stream {}/{} ready", self.log_group, name);
                Ok::<(), ShipperError>(())
            })
            .await?;
        Ok(state)
    }

    /// Returns the state of `name`, registering it without remote provisioning.
    pub fn state(&self, name: &str) -> Arc<StreamState> {
        let mut streams = self.lock();
        Arc::clone(
            streams
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(StreamState::new(name))),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<StreamState>> {
        self.lock().get(name).cloned()
    }

    /// Current sequence token of `name`; `None` for unknown streams too.
    pub async fn token(&self, name: &str) -> Option<String> {
        let state = self.get(name)?;
        state.sequence_token().await
    }

    #[must_use]
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<StreamState>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn idempotent_create(result: Result<(), ApiError>) -> Result<(), ApiError> {
    match result {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}
