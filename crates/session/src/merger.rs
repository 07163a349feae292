//! Per-timestamp merge of the detector results.
//!
//! [`DetectionMerger::merge_at`] queries both detectors (and the trigger
//! region in dual-area mode) concurrently and stitches whatever succeeded
//! into one [`MergedDetectionFrame`]. Responses can resolve out of order;
//! [`FrameFence`] lets the caller drop superseded ones.

use std::sync::Arc;

use roisync_core::detection::{MergedDetectionFrame, TriggerResult};
use roisync_core::geometry::DisplayMapping;
use roisync_core::types::PixelRect;
use roisync_detection::backend::TriggerBackend;
use roisync_detection::job::{DetectionJobManager, QueryError};
use roisync_detection::kind::{Code, DetectorKind, Movement};
use roisync_detection::messages::TriggerQuery;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("All detection queries failed at {timestamp}s")]
    AllQueriesFailed { timestamp: f64 },
}

/// Trigger sub-region and the literal it must show.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerTarget {
    /// Trigger area in source pixels.
    pub region: PixelRect,
    pub target_text: String,
}

pub struct DetectionMerger {
    movement: Arc<DetectionJobManager<Movement>>,
    code: Arc<DetectionJobManager<Code>>,
    trigger: Option<Arc<dyn TriggerBackend>>,
}

impl DetectionMerger {
    pub fn new(
        movement: Arc<DetectionJobManager<Movement>>,
        code: Arc<DetectionJobManager<Code>>,
    ) -> Self {
        Self {
            movement,
            code,
            trigger: None,
        }
    }

    /// Enable trigger queries (dual-area mode). They run against the code
    /// job's cache handle.
    pub fn with_trigger_backend(mut self, backend: Arc<dyn TriggerBackend>) -> Self {
        self.trigger = Some(backend);
        self
    }

    /// Merge the detections at `timestamp`.
    ///
    /// Fails only if every issued query failed. The trigger query is
    /// issued only when a trigger backend is set and `trigger` is given.
    pub async fn merge_at(
        &self,
        timestamp: f64,
        mapping: &DisplayMapping,
        trigger: Option<&TriggerTarget>,
    ) -> Result<MergedDetectionFrame, MergeError> {
        let trigger_query = async {
            match (&self.trigger, trigger) {
                (Some(backend), Some(target)) => {
                    Some(self.query_trigger(backend.as_ref(), target, timestamp, mapping).await)
                }
                _ => None,
            }
        };

        let (movement, codes, trigger_result) = tokio::join!(
            self.movement.query_at(timestamp, mapping),
            self.code.query_at(timestamp, mapping),
            trigger_query,
        );

        let issued = 2 + usize::from(trigger_result.is_some());
        let mut failed = 0;

        let movement = match movement {
            Ok(found) => Some(found),
            Err(e) => {
                failed += 1;
                report_failure(self.movement.as_ref(), "detections", timestamp, &e).await;
                None
            }
        };
        let codes = match codes {
            Ok(found) => Some(found),
            Err(e) => {
                failed += 1;
                report_failure(self.code.as_ref(), "detections", timestamp, &e).await;
                None
            }
        };
        let trigger = match trigger_result {
            Some(Ok(result)) => Some(result),
            Some(Err(e)) => {
                failed += 1;
                report_failure(self.code.as_ref(), "trigger", timestamp, &e).await;
                None
            }
            None => None,
        };

        if failed == issued {
            return Err(MergeError::AllQueriesFailed { timestamp });
        }
        Ok(MergedDetectionFrame::from_parts(timestamp, movement, codes, trigger))
    }

    // ---- private helpers ----

    async fn query_trigger(
        &self,
        backend: &dyn TriggerBackend,
        target: &TriggerTarget,
        timestamp: f64,
        mapping: &DisplayMapping,
    ) -> Result<TriggerResult, QueryError> {
        let cache_key = self
            .code
            .cache_key()
            .await
            .ok_or(QueryError::NotReady(Code::NAME))?;

        let query = TriggerQuery {
            timestamp,
            display: mapping.display(),
            source: mapping.source(),
            region: target.region,
            target_text: target.target_text.clone(),
        };
        let resp = backend.query_trigger(&cache_key, &query).await?;
        if !resp.success {
            return Err(QueryError::Unsuccessful("trigger query unsuccessful".to_string()));
        }
        Ok(TriggerResult {
            detected: resp.detected,
            text: resp.text,
        })
    }
}

/// Log a failed constituent query.
///
/// Failures while the owning job is still running are expected and kept
/// at debug level.
async fn report_failure<K: DetectorKind>(
    owner: &DetectionJobManager<K>,
    query: &'static str,
    timestamp: f64,
    error: &QueryError,
) {
    let transient = matches!(error, QueryError::NotReady(_)) || !owner.is_completed().await;
    if transient {
        tracing::debug!(detector = K::NAME, query, timestamp, error = %error, "Query not available yet");
    } else {
        tracing::warn!(detector = K::NAME, query, timestamp, error = %error, "Detection query failed");
    }
}

// ---------------------------------------------------------------------------
// Response fencing
// ---------------------------------------------------------------------------

/// Issue-order fence for merge responses.
///
/// Each request takes a ticket from [`FrameFence::issue`]; a response is
/// accepted only if no later-issued response has been accepted already.
/// Ordering by issue rather than by timestamp keeps backward seeks working.
#[derive(Debug, Default)]
pub struct FrameFence {
    next_ticket: u64,
    accepted: Option<u64>,
}

/// Sequence number handed out by [`FrameFence::issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl FrameFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Returns `true` if the response for `ticket` should be applied.
    pub fn accept(&mut self, ticket: Ticket) -> bool {
        if self.accepted.is_some_and(|last| ticket.0 <= last) {
            return false;
        }
        self.accepted = Some(ticket.0);
        true
    }

    /// Reject every ticket issued so far.
    pub fn invalidate(&mut self) {
        self.accepted = self.next_ticket.checked_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_response_is_dropped() {
        let mut fence = FrameFence::new();
        let first = fence.issue();
        let second = fence.issue();

        assert!(fence.accept(second));
        assert!(!fence.accept(first));
    }

    #[test]
    fn in_order_responses_are_all_accepted() {
        let mut fence = FrameFence::new();
        let tickets: Vec<_> = (0..3).map(|_| fence.issue()).collect();
        assert!(tickets.into_iter().all(|t| fence.accept(t)));
    }

    #[test]
    fn invalidate_rejects_outstanding_tickets() {
        let mut fence = FrameFence::new();
        let pending = fence.issue();
        fence.invalidate();

        assert!(!fence.accept(pending));
        let fresh = fence.issue();
        assert!(fence.accept(fresh));
    }

    #[test]
    fn invalidate_on_fresh_fence_is_noop() {
        let mut fence = FrameFence::new();
        fence.invalidate();
        let ticket = fence.issue();
        assert!(fence.accept(ticket));
    }
}
