//! Save round trip for a tracked graph
//!
//! ## Pipeline (in order):
//! 1. Extract the delta (no changes: return without touching the store)
//! 2. Validate and assign store flags
//! 3. Commit (the only suspension point)
//! 4. Merge the store's answer back into the tracked graph
//!
//! A failure at any step leaves the tracked graph exactly as it was, so the
//! caller can inspect it, fix it and save again.

use std::time::Instant;

use graphdelta_core::errors::{ExError, Result};
use graphdelta_core::{
    apply_changes, get_changes, merge_changes, ApplyReport, Entity, Graph, MergeReport,
    StoreHandle,
};
use graphdelta_core_types::RequestContext;

use crate::config::TrackerConfig;

const OP_SAVE_CHANGES: &str = "save_changes";

/// Result of a successful save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was pending; the store was not called
    NoChanges,
    /// The delta was committed and merged back
    Saved {
        apply: ApplyReport,
        merge: MergeReport,
    },
}

impl SaveOutcome {
    fn label(&self) -> &'static str {
        match self {
            SaveOutcome::NoChanges => "no_changes",
            SaveOutcome::Saved { .. } => "saved",
        }
    }
}

/// A tracked graph plus the options its round trips run with
#[derive(Debug, Clone)]
pub struct ChangeTracker<E> {
    graph: Graph<E>,
    config: TrackerConfig,
}

impl<E: Entity> ChangeTracker<E> {
    pub fn new(graph: Graph<E>, config: TrackerConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Graph<E> {
        &self.graph
    }

    /// Edit access; changes are recorded by the graph's own observation
    pub fn graph_mut(&mut self) -> &mut Graph<E> {
        &mut self.graph
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn into_graph(self) -> Graph<E> {
        self.graph
    }

    /// Pending delta, for callers that ship it themselves
    pub fn get_changes(&self) -> Option<Graph<E>> {
        get_changes(&self.graph)
    }

    /// Extract, apply, commit and merge
    ///
    /// # Errors
    ///
    /// Graph-shape errors before the store is called; store errors from the
    /// commit, classified but not retried; `IdentifierMismatch` when the
    /// store's answer cannot be correlated. The returned error carries the
    /// request id of `ctx`.
    pub async fn save_changes<S>(
        &mut self,
        store: &mut S,
        ctx: &RequestContext,
    ) -> std::result::Result<SaveOutcome, ExError>
    where
        S: StoreHandle<E> + ?Sized,
    {
        let start = Instant::now();
        graphdelta_core::log_op_start!(
            OP_SAVE_CHANGES,
            request_id = ctx.request_id.as_str(),
            nodes = self.graph.len()
        );

        let result = self.round_trip(store).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                graphdelta_core::log_op_end!(
                    OP_SAVE_CHANGES,
                    duration_ms = duration_ms,
                    request_id = ctx.request_id.as_str(),
                    outcome = outcome.label()
                );
                Ok(outcome)
            }
            Err(err) => {
                graphdelta_core::log_op_error!(
                    OP_SAVE_CHANGES,
                    &err,
                    duration_ms = duration_ms,
                    request_id = ctx.request_id.as_str()
                );
                let mut ex_err = ExError::from(err)
                    .with_op(OP_SAVE_CHANGES)
                    .with_request_id(ctx.request_id.clone());
                if let Some(trace_id) = &ctx.trace_id {
                    ex_err = ex_err.with_trace_id(trace_id.clone());
                }
                Err(ex_err)
            }
        }
    }

    async fn round_trip<S>(&mut self, store: &mut S) -> Result<SaveOutcome>
    where
        S: StoreHandle<E> + ?Sized,
    {
        let Some(delta) = get_changes(&self.graph) else {
            return Ok(SaveOutcome::NoChanges);
        };
        tracing::debug!(delta_len = delta.len(), "delta extracted");

        let apply = apply_changes(&delta, store, &self.config.apply)?;
        let reconciled = store.commit().await?;
        // merge plans before it mutates, so a mismatch leaves the graph as is
        let merge = merge_changes(&mut self.graph, &reconciled, &self.config.merge)?;

        Ok(SaveOutcome::Saved { apply, merge })
    }
}
