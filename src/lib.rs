//! Non-custodial Solana wallet core.
//!
//! Front-ends talk to [`WalletService`]; everything underneath (key vault,
//! RPC gateway, transaction pipeline, stake decoding, swap providers) is
//! usable on its own.

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod rpc;
pub mod stake;
pub mod swap;
pub mod transaction;
pub mod wallet;

pub use cancel::CancelSignal;
pub use config::WalletConfig;
pub use error::{Result, RpcError, RpcErrorKind, WalletError};
pub use events::{EventBus, WalletEvent};
pub use rpc::{RpcGateway, SolanaNetwork};
pub use wallet::{Portfolio, WalletService};
