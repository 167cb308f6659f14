// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod balance;
pub mod block;
pub mod contract;
pub mod event;
pub mod guard;
pub mod signer;
pub mod streaming_error;
pub mod sync_error;
pub mod sync_status;
pub mod transaction;
pub mod transfer;

pub use balance::{Balance, NewBalance};
pub use block::{Block, NewBlock};
pub use contract::{Contract, NewContract};
pub use event::{Event, NewEvent};
pub use guard::{Guard, NewGuard};
pub use signer::{NewSigner, Signer};
pub use streaming_error::{NewStreamingError, StreamingError};
pub use sync_error::{NewSyncError, SyncError};
pub use sync_status::{NewSyncStatus, SyncSource, SyncStatus};
pub use transaction::{NewTransaction, Transaction, COINBASE_SENDER};
pub use transfer::{classify_transfer_module, NewTransfer, Transfer, TransferType};
