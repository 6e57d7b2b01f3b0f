//! Stake account decoding and aggregation.
//!
//! Read path only: delegate, deactivate and withdraw instructions are not built here.

pub mod decoder;
pub mod overview;

pub use decoder::{decode_stake_account, DecodeContext, Delegation, StakeAccountInfo, StakeState};
pub use overview::{fetch_stake_overview, StakeOverview};
