use serde::Serialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::Result;
use crate::rpc::RpcGateway;
use crate::stake::decoder::{decode_stake_account, DecodeContext, StakeAccountInfo, StakeState};

/// Allocation size of a stake account, used only to price its rent-exempt reserve.
/// Accounts are not filtered by size: the decoder reads delegation fields past
/// this length and degrades shorter data on its own.
pub const STAKE_ACCOUNT_SIZE: usize = 200;

/// Byte offset of the withdraw authority inside the account meta
pub const WITHDRAWER_OFFSET: usize = 44;

/// Stake balances for one owner, bucketed by lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StakeOverview {
    pub accounts: Vec<StakeAccountInfo>,
    pub total_active: u64,
    pub total_activating: u64,
    pub total_deactivating: u64,
    pub total_inactive: u64,
    pub total_withdrawable: u64,
    pub current_epoch: u64,
}

impl StakeOverview {
    /// Sum balances per lifecycle state. Input order does not matter.
    pub fn from_accounts(accounts: Vec<StakeAccountInfo>, current_epoch: u64) -> Self {
        let mut overview = StakeOverview {
            current_epoch,
            ..Default::default()
        };

        for account in &accounts {
            let bucket = match account.state {
                StakeState::Active => &mut overview.total_active,
                StakeState::Activating => &mut overview.total_activating,
                StakeState::Deactivating => &mut overview.total_deactivating,
                StakeState::Inactive => &mut overview.total_inactive,
            };
            *bucket = bucket.saturating_add(account.balance_lamports);
            overview.total_withdrawable = overview
                .total_withdrawable
                .saturating_add(account.withdrawable_lamports);
        }

        overview.accounts = accounts;
        overview
    }

    /// Balance across every state
    pub fn total_staked(&self) -> u64 {
        self.total_active
            .saturating_add(self.total_activating)
            .saturating_add(self.total_deactivating)
            .saturating_add(self.total_inactive)
    }

    pub fn degraded_count(&self) -> usize {
        self.accounts.iter().filter(|a| a.warning.is_some()).count()
    }
}

/// `getProgramAccounts` filters selecting accounts withdrawable by `owner`
pub fn stake_account_filters(owner: &Pubkey) -> Value {
    json!([
        {"memcmp": {"offset": WITHDRAWER_OFFSET, "bytes": owner.to_string()}}
    ])
}

/// Find and decode every stake account whose withdraw authority is `owner`
pub async fn fetch_stake_overview(gateway: &RpcGateway, owner: &Pubkey) -> Result<StakeOverview> {
    let stake_program = solana_sdk::stake::program::id();
    let filters = stake_account_filters(owner);

    let (accounts, epoch_info, rent_exempt) = tokio::try_join!(
        gateway.get_program_accounts(&stake_program, filters),
        gateway.get_epoch_info(),
        gateway.get_minimum_balance_for_rent_exemption(STAKE_ACCOUNT_SIZE),
    )?;

    let ctx = DecodeContext {
        current_epoch: epoch_info.epoch,
        rent_exempt_lamports: rent_exempt,
    };

    let decoded: Vec<StakeAccountInfo> = accounts
        .iter()
        .filter_map(|keyed| {
            let Ok(pubkey) = Pubkey::from_str(&keyed.pubkey) else {
                warn!(account = %keyed.pubkey, "skipping stake account with malformed address");
                return None;
            };
            let data = keyed.account.decode_data().unwrap_or_default();
            Some(decode_stake_account(pubkey, &data, keyed.account.lamports, ctx))
        })
        .collect();

    debug!(%owner, count = decoded.len(), epoch = ctx.current_epoch, "stake accounts decoded");
    Ok(StakeOverview::from_accounts(decoded, ctx.current_epoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::gateway::tests::{method, rpc_result, test_gateway};
    use crate::stake::decoder::tests::delegated_bytes;
    use crate::stake::decoder::NO_DEACTIVATION;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use mockito::{Matcher, Server};

    fn info(state: StakeState, balance: u64, withdrawable: u64) -> StakeAccountInfo {
        StakeAccountInfo {
            pubkey: Pubkey::new_unique(),
            state,
            delegated: None,
            rent_exempt_lamports: 0,
            balance_lamports: balance,
            withdrawable_lamports: withdrawable,
            warning: None,
        }
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let accounts = vec![
            info(StakeState::Active, 100, 0),
            info(StakeState::Inactive, 40, 40),
            info(StakeState::Deactivating, 7, 0),
            info(StakeState::Active, 50, 0),
            info(StakeState::Activating, 3, 0),
        ];
        let mut reversed = accounts.clone();
        reversed.reverse();

        let a = StakeOverview::from_accounts(accounts, 10);
        let b = StakeOverview::from_accounts(reversed, 10);

        assert_eq!(a.total_active, 150);
        assert_eq!(a.total_activating, 3);
        assert_eq!(a.total_deactivating, 7);
        assert_eq!(a.total_inactive, 40);
        assert_eq!(a.total_withdrawable, 40);
        assert_eq!(a.total_staked(), 200);
        assert_eq!(
            (a.total_active, a.total_inactive, a.total_withdrawable),
            (b.total_active, b.total_inactive, b.total_withdrawable)
        );
    }

    #[test]
    fn test_empty_overview() {
        let overview = StakeOverview::from_accounts(Vec::new(), 5);
        assert_eq!(overview.total_staked(), 0);
        assert_eq!(overview.current_epoch, 5);
    }

    #[test]
    fn test_filters_select_by_withdrawer_only() {
        let owner = Pubkey::new_unique();
        assert_eq!(
            stake_account_filters(&owner),
            json!([{"memcmp": {"offset": 44, "bytes": owner.to_string()}}])
        );
    }

    #[tokio::test]
    async fn test_fetch_stake_overview() {
        let mut server = Server::new_async().await;
        let owner = Pubkey::new_unique();
        let stake_program = solana_sdk::stake::program::id();
        let active = delegated_bytes(&Pubkey::new_unique(), 1_000, 10, NO_DEACTIVATION);
        assert_eq!(active.len(), 276);

        let accounts = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "getProgramAccounts",
                "params": [
                    stake_program.to_string(),
                    {"encoding": "base64", "filters": [
                        {"memcmp": {"offset": WITHDRAWER_OFFSET, "bytes": owner.to_string()}}
                    ]}
                ]
            })))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!([
                {
                    "pubkey": Pubkey::new_unique().to_string(),
                    "account": {
                        "lamports": 3_000,
                        "owner": stake_program.to_string(),
                        "data": [BASE64.encode(&active), "base64"],
                        "executable": false
                    }
                },
                {
                    "pubkey": Pubkey::new_unique().to_string(),
                    "account": {
                        "lamports": 500,
                        "owner": stake_program.to_string(),
                        "data": ["AQ==", "base64"],
                        "executable": false
                    }
                }
            ])))
            .expect(1)
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getEpochInfo"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({
                "epoch": 20, "slotIndex": 1, "slotsInEpoch": 432000, "absoluteSlot": 8640001
            })))
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getMinimumBalanceForRentExemption"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!(2_282_880)))
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let overview = fetch_stake_overview(&gateway, &owner).await.unwrap();

        assert_eq!(overview.accounts.len(), 2);
        assert_eq!(overview.current_epoch, 20);
        assert_eq!(overview.total_active, 3_000);
        assert_eq!(overview.accounts[0].state, StakeState::Active);
        assert_eq!(overview.accounts[0].delegated.as_ref().map(|d| d.stake_lamports), Some(1_000));
        assert_eq!(overview.total_inactive, 500);
        assert_eq!(overview.total_withdrawable, 500);
        assert_eq!(overview.degraded_count(), 1);
        assert!(overview.accounts.iter().all(|a| a.rent_exempt_lamports == 2_282_880));
        accounts.assert_async().await;
    }
}
