pub mod response;
pub mod runtime;
pub mod zone_name;

use serde::{Deserialize, Serialize};

pub use response::{parse_flow_response, ParsedFlowData, RejectedReading, ZoneDirectory};
pub use runtime::parse_runtime_minutes;
pub use zone_name::parse_zone_name;

/// What to do with a reading that cannot be turned into a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Leave the reading out, log it, and keep the rest of the batch.
    #[default]
    DropRecord,
    /// Fail the whole batch with the first rejection.
    RejectBatch,
}
