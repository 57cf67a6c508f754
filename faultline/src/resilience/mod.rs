//! Retry, circuit breaking and their composition.
//!
//! A dependency call normally goes through [`GuardedCall`]: the breaker
//! decides whether the call may run at all, the retrier absorbs transient
//! failures, and the breaker records the final outcome.

mod breaker;
mod guarded;
mod registry;
mod retry;

pub use breaker::{
    admit, record, Admission, BreakerSnapshot, BreakerState, BreakerStateKind, CircuitBreaker,
    Transition,
};
pub use guarded::GuardedCall;
pub use registry::BreakerRegistry;
pub use retry::{with_retry, JitterStrategy, Retrier, RetryPolicy, RetryReport};
