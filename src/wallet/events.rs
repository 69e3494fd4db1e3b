use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::account::TransactionStatus;
use super::output_store::OutputData;
use crate::ledger::TransactionId;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TransactionProgress {
    SelectingInputs,
    GeneratingRemainderDepositAddress { address: String },
    PreparedTransaction { inputs: usize, outputs: usize },
    SigningTransaction,
    Broadcasting,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    NewOutput(Box<OutputData>),
    SpentOutput(Box<OutputData>),
    TransactionInclusion {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },
    TransactionProgress(TransactionProgress),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub account_index: u32,
    pub event: WalletEvent,
}

/// Fan-out of wallet events; events sent with no subscriber are dropped
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sender: broadcast::Sender<Event>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit(&self, account_index: u32, event: WalletEvent) {
        log::trace!("Account {} event: {:?}", account_index, event);
        let _ = self.sender.send(Event {
            account_index,
            event,
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
