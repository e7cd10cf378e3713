pub mod api;
pub mod errors;
pub mod http;
pub mod parser;
pub mod ws;

pub use api::{AlertDispatcher, PushConnector, PushStream, SignalApi};
pub use errors::SignalApiError;
pub use http::SignalHttpClient;
pub use parser::{parse_signal_payload, split_frame};
pub use ws::SignalWsConnector;
