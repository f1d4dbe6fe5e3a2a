mod correlator;
mod error;
mod frame;

pub use correlator::{Correlator, PendingResponse};
pub use error::ProtocolError;
pub use frame::{Frame, JsonRpcError, JsonRpcVersion, Message, ResponseOutcome};
