pub mod rate_limit;

pub use rate_limit::{Admission, RateLimit, rate_limit_middleware};
