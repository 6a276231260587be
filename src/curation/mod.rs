pub mod quota;
pub mod score;
pub mod tags;

pub use quota::{DayWindow, QuotaDecision, QuotaGate};
pub use score::calculate_score;
pub use tags::{TagRefresh, compute_tag, refresh_tags};
