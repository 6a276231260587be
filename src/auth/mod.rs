pub mod middleware;
pub mod secret;

pub use middleware::{AuthError, CronAuth};
pub use secret::constant_time_eq;
