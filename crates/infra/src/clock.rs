//! Injectable wall clock for time-based policies (snapshot age, quota windows).

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Shared source of "now".
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Clock backed by [`Utc::now`].
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Clock that always returns `at`.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}
