//! Stake account layout decoding.
//!
//! Layout (all integers little-endian):
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | discriminator (0 uninit, 1 init, 2 delegated) |
//! | 220    | 32   | vote account                           |
//! | 252    | 8    | delegated stake (lamports)             |
//! | 260    | 8    | activation epoch                       |
//! | 268    | 8    | deactivation epoch (`u64::MAX` = none) |
//!
//! Unreadable input never fails: it decodes as `Inactive` with the whole
//! balance withdrawable and a warning attached.

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

pub const DISCRIMINATOR_UNINITIALIZED: u32 = 0;
pub const DISCRIMINATOR_INITIALIZED: u32 = 1;
pub const DISCRIMINATOR_DELEGATED: u32 = 2;

pub const VOTE_PUBKEY_OFFSET: usize = 220;
pub const STAKE_OFFSET: usize = 252;
pub const ACTIVATION_EPOCH_OFFSET: usize = 260;
pub const DEACTIVATION_EPOCH_OFFSET: usize = 268;
pub const DELEGATED_MIN_LEN: usize = DEACTIVATION_EPOCH_OFFSET + 8;

/// Sentinel for "not deactivating"
pub const NO_DEACTIVATION: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delegation {
    pub vote_pubkey: Pubkey,
    pub stake_lamports: u64,
    pub activation_epoch: u64,
    pub deactivation_epoch: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakeAccountInfo {
    pub pubkey: Pubkey,
    pub state: StakeState,
    pub delegated: Option<Delegation>,
    pub rent_exempt_lamports: u64,
    pub balance_lamports: u64,
    pub withdrawable_lamports: u64,
    /// Set when the bytes could not be read and the conservative default applied
    pub warning: Option<String>,
}

/// Inputs that come from outside the account bytes
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub current_epoch: u64,
    pub rent_exempt_lamports: u64,
}

/// Decode raw stake account bytes against the current epoch
pub fn decode_stake_account(
    pubkey: Pubkey,
    data: &[u8],
    balance_lamports: u64,
    ctx: DecodeContext,
) -> StakeAccountInfo {
    match try_decode(data, ctx.current_epoch) {
        Ok((state, delegated)) => {
            let withdrawable_lamports = match state {
                StakeState::Inactive => balance_lamports,
                _ => 0,
            };
            StakeAccountInfo {
                pubkey,
                state,
                delegated,
                rent_exempt_lamports: ctx.rent_exempt_lamports,
                balance_lamports,
                withdrawable_lamports,
                warning: None,
            }
        }
        Err(reason) => {
            warn!(%pubkey, len = data.len(), "stake account decode failed, reporting inactive: {}", reason);
            StakeAccountInfo {
                pubkey,
                state: StakeState::Inactive,
                delegated: None,
                rent_exempt_lamports: ctx.rent_exempt_lamports,
                balance_lamports,
                withdrawable_lamports: balance_lamports,
                warning: Some(reason),
            }
        }
    }
}

fn try_decode(data: &[u8], current_epoch: u64) -> Result<(StakeState, Option<Delegation>), String> {
    let discriminator = read_u32(data, 0).ok_or("account data shorter than discriminator")?;

    match discriminator {
        DISCRIMINATOR_UNINITIALIZED | DISCRIMINATOR_INITIALIZED => Ok((StakeState::Inactive, None)),
        DISCRIMINATOR_DELEGATED => {
            if data.len() < DELEGATED_MIN_LEN {
                return Err(format!(
                    "delegated account needs {} bytes, got {}",
                    DELEGATED_MIN_LEN,
                    data.len()
                ));
            }
            let vote_bytes: [u8; 32] = data[VOTE_PUBKEY_OFFSET..VOTE_PUBKEY_OFFSET + 32]
                .try_into()
                .map_err(|_| "vote pubkey out of range".to_string())?;
            let stake_lamports = read_u64(data, STAKE_OFFSET).ok_or("stake out of range")?;
            let activation_epoch =
                read_u64(data, ACTIVATION_EPOCH_OFFSET).ok_or("activation epoch out of range")?;
            let raw_deactivation =
                read_u64(data, DEACTIVATION_EPOCH_OFFSET).ok_or("deactivation epoch out of range")?;
            let deactivation_epoch = (raw_deactivation != NO_DEACTIVATION).then_some(raw_deactivation);

            let state = derive_state(activation_epoch, deactivation_epoch, current_epoch);
            Ok((
                state,
                Some(Delegation {
                    vote_pubkey: Pubkey::new_from_array(vote_bytes),
                    stake_lamports,
                    activation_epoch,
                    deactivation_epoch,
                }),
            ))
        }
        other => Err(format!("unknown discriminator {}", other)),
    }
}

/// Lifecycle state of a delegation at `current_epoch`
pub fn derive_state(activation_epoch: u64, deactivation_epoch: Option<u64>, current_epoch: u64) -> StakeState {
    match deactivation_epoch {
        Some(epoch) if current_epoch >= epoch => StakeState::Inactive,
        Some(_) => StakeState::Deactivating,
        None if current_epoch >= activation_epoch => StakeState::Active,
        None => StakeState::Activating,
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}
