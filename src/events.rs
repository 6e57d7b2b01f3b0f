use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tokio::sync::broadcast;
use tracing::trace;

use crate::rpc::HealthStatus;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalletEvent {
    // Wallet events
    WalletAdded { index: u32, pubkey: Pubkey },
    WalletRemoved { index: u32 },
    WalletRenamed { index: u32, name: String },
    WalletHidden { index: u32, hidden: bool },
    ActiveChanged { index: u32 },
    LoggedOut,

    // Transaction events
    TransactionSubmitted { signature: Signature, from: Pubkey },
    TransactionConfirmed { signature: Signature, slot: u64 },
    TransactionFailed { signature: Signature, reason: String },

    // Balance events
    BalanceUpdated { pubkey: Pubkey, lamports: u64 },

    // Network events
    HealthChanged { endpoint: String, status: HealthStatus },
}

/// Fan-out of [`WalletEvent`]s. Sending never blocks and never fails when
/// nobody is listening; slow subscribers see `Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<WalletEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: WalletEvent) {
        trace!(?event, "wallet event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(WalletEvent::LoggedOut);

        let mut rx = bus.subscribe();
        bus.emit(WalletEvent::ActiveChanged { index: 2 });
        assert_eq!(rx.recv().await.unwrap(), WalletEvent::ActiveChanged { index: 2 });
    }
}
