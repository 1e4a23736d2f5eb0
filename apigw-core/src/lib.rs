pub mod config;
pub mod consumer;
pub mod context;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod interface;
pub mod signer;

pub use config::GatewayConfig;
pub use consumer::Consumer;
pub use context::{Action, Envelope, RequestContext, TerminalResponse};
pub use error::GatewayError;
pub use filter::Filter;
pub use interface::{AuthType, InterfaceRecord, InterfaceStatus};
