//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! The runner applies envelopes in strictly increasing global position and
//! tracks a cursor so redelivered envelopes are skipped.

use thiserror::Error;
use tracing::debug;

use chronicle_core::TenantId;

use crate::bus::Subscription;
use crate::envelope::EventEnvelope;
use crate::projection::Projection;

/// Tracks projection progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    tenant_id: Option<TenantId>,
    last_global_position: u64,
}

impl ProjectionCursor {
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn last_global_position(&self) -> u64 {
        self.last_global_position
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("projection pinned to tenant {expected:?}, got event for {found:?}")]
    TenantMismatch {
        expected: Option<TenantId>,
        found: Option<TenantId>,
    },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: ProjectionCursor,
    pinned: bool,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: ProjectionCursor {
                tenant_id: None,
                last_global_position: 0,
            },
            pinned: false,
        }
    }

    /// Create a runner that rejects envelopes from any other tenant.
    pub fn new_for_tenant(tenant_id: TenantId, projection: P) -> Self {
        Self {
            projection,
            cursor: ProjectionCursor {
                tenant_id: Some(tenant_id),
                last_global_position: 0,
            },
            pinned: true,
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn cursor(&self) -> ProjectionCursor {
        self.cursor
    }

    /// Apply one envelope. Returns `Ok(false)` when it was skipped (already
    /// applied, or not matching the projection's filter).
    pub fn apply(&mut self, envelope: &EventEnvelope) -> Result<bool, ProjectionError> {
        if self.pinned && envelope.tenant_id() != self.cursor.tenant_id {
            return Err(ProjectionError::TenantMismatch {
                expected: self.cursor.tenant_id,
                found: envelope.tenant_id(),
            });
        }

        let position = envelope.global_position();
        if position <= self.cursor.last_global_position {
            debug!(
                projection = self.projection.name(),
                position,
                cursor = self.cursor.last_global_position,
                "skipping already applied event"
            );
            return Ok(false);
        }

        let matched = self.projection.filter().matches(envelope);
        if matched {
            self.projection.apply(envelope);
        }
        self.cursor.last_global_position = position;
        Ok(matched)
    }

    /// Apply many envelopes in order; returns how many were applied.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope>,
    ) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for env in envelopes {
            if self.apply(env)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Apply everything currently queued on a live subscription.
    pub fn catch_up(&mut self, subscription: &mut Subscription) -> Result<usize, ProjectionError> {
        let pending = subscription.drain();
        self.run(pending.iter())
    }

    /// Rebuild a projection from scratch by replaying the full history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope>,
    ) -> Result<(P, ProjectionCursor), ProjectionError> {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}
