//! Dispatch span helpers.
//!
//! Spans are only opened on the slow paths (rejections and inline drains);
//! the per-task hot path records metrics and `debug` events instead.

use std::fmt::Debug;

use tracing::Span;

/// Start a span covering an inline drain of `key`.
///
/// The `keyseq.drained` field is declared empty and filled by
/// [`record_drained`] once the queue is exhausted.
pub fn start_drain_span(key: &dyn Debug, reason: &str) -> Span {
    tracing::warn_span!(
        "keyseq.drain_inline",
        "keyseq.key" = ?key,
        "keyseq.reason" = reason,
        "keyseq.drained" = tracing::field::Empty,
    )
}

/// Record how many tasks the inline drain ran.
pub fn record_drained(span: &Span, count: u64) {
    span.record("keyseq.drained", count);
    span.in_scope(|| {
        tracing::warn!(drained = count, "key drained inline and closed");
    });
}
