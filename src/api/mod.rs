//! Remote controller API: token exchange and flow-report queries.

pub mod auth;
pub mod flow;
pub mod transport;

pub mod testing;

pub use auth::authenticate;
pub use flow::{fetch_flow_data, RawFlowResponse};
pub use transport::{ApiTransport, HttpReply, ReqwestTransport};
