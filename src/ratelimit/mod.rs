//! Rate limiting logic and admission control.

mod gate;
mod key;
mod limiter;
mod policy;

pub use gate::Gate;
pub use key::{RateLimitKey, Subject};
pub use limiter::RateLimiter;
pub use policy::Policy;
