//! Wallet-facing notifications published by the router and the execution manager.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::router::routes::{Path, Route};
use crate::transactions::{SentTransaction, SigningDetails};
use crate::types::{ChainId, ErrorResponse, MultiTransactionType, SendType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    SuggestedRoutes {
        uuid: String,
        best: Route,
        candidates: Vec<Path>,
        error: Option<ErrorResponse>,
        /// true for fee refreshes of an already published route
        updated: bool,
    },
    SendingTransactionsStarted {
        uuid: String,
        send_type: SendType,
    },
    SignRouterTransactions {
        uuid: String,
        send_type: SendType,
        signing_details: Option<SigningDetails>,
        error: Option<ErrorResponse>,
    },
    TransactionsSent {
        uuid: String,
        send_type: SendType,
        from_chain: ChainId,
        to_chain: ChainId,
        multi_tx_type: Option<MultiTransactionType>,
        sent_transactions: Vec<SentTransaction>,
        error: Option<ErrorResponse>,
    },
}

impl WalletEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::SuggestedRoutes { .. } => "wallet.suggested.routes",
            WalletEvent::SendingTransactionsStarted { .. } => "wallet.router.sending-transactions-started",
            WalletEvent::SignRouterTransactions { .. } => "wallet.router.sign-transactions",
            WalletEvent::TransactionsSent { .. } => "wallet.router.transactions-sent",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: WalletEvent);
}

/// Forwards events into an unbounded channel; a dropped receiver only logs.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<WalletEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WalletEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn shared() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<WalletEvent>) {
        let (sink, rx) = Self::new();
        (Arc::new(sink), rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, event: WalletEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            warn!("📭 event receiver dropped, {} lost", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.publish(WalletEvent::SendingTransactionsStarted { uuid: "a".into(), send_type: SendType::Swap }).await;
        sink.publish(WalletEvent::SignRouterTransactions {
            uuid: "a".into(),
            send_type: SendType::Swap,
            signing_details: None,
            error: Some(ErrorResponse::new("WR-006", "no route")),
        })
        .await;

        assert_eq!(rx.recv().await.unwrap().name(), "wallet.router.sending-transactions-started");
        match rx.recv().await.unwrap() {
            WalletEvent::SignRouterTransactions { error, .. } => assert_eq!(error.unwrap().code, "WR-006"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.publish(WalletEvent::SendingTransactionsStarted { uuid: "a".into(), send_type: SendType::Transfer }).await;
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WalletEvent::SendingTransactionsStarted { uuid: "u".into(), send_type: SendType::Bridge };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sending_transactions_started");
        assert_eq!(json["send_type"], "bridge");
    }
}
