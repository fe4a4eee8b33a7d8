pub mod history;
pub mod session;
pub mod zone_record;

pub use history::HistoryTable;
pub use session::{Credentials, Session};
pub(crate) use session::TokenResponse;
pub use zone_record::{AnomalyScores, FlowReading, RecordKey, ZoneRecord};
