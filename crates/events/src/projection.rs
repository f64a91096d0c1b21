use crate::bus::SubscriptionFilter;
use crate::envelope::EventEnvelope;

/// A projection builds a read model from the committed event stream.
///
/// Projections are disposable: they can be dropped and rebuilt by replaying
/// events (see [`ProjectionRunner::rebuild_from_scratch`]).
///
/// ## Idempotency
///
/// Delivery is at-least-once, so the same envelope may be offered more than once.
/// The [`ProjectionRunner`](crate::ProjectionRunner) skips anything at or below
/// its cursor, but `apply` should still be safe to repeat.
pub trait Projection {
    /// Stable name, used for logs and cursor bookkeeping.
    fn name(&self) -> &str;

    /// Which events this projection consumes.
    fn filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::all()
    }

    /// Apply a single envelope to the read model.
    fn apply(&mut self, envelope: &EventEnvelope);
}
