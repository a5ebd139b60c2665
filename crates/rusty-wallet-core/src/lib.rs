pub mod approval;
pub mod cache;
pub mod chains;
pub mod context;
pub mod controller;
pub mod domain;
pub mod error;
pub mod messages;
pub mod permission;
pub mod ports;
pub mod registry;
pub mod signer;
pub mod submit;
pub mod tx_builder;

pub use controller::{rpc_response, ControllerSettings, ProviderController};
pub use domain::*;
pub use error::ProviderError;
pub use ports::{PortError, Ports};
