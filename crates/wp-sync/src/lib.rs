//! Keeps one duplicate-free view of the wave log while three sources feed
//! it: the bulk read on connect, the live event feed and the client's own
//! waves.

mod bootstrap;
mod connection;
mod error;
mod notices;
mod portal;
mod store;
mod subscription;
mod transaction;

#[cfg(test)]
mod testing;

pub use bootstrap::{BootstrapOutcome, bootstrap};
pub use connection::{Connection, Session};
pub use error::{WaveBlocked, WaveError};
pub use notices::NoticeBoard;
pub use portal::{PortalOptions, WaveOutcome, WavePortal};
pub use store::{EntryStore, StoreHandle, StoreSnapshot};
pub use subscription::EventSubscription;
pub use transaction::{Settlement, TransactionLifecycle, WaveContext};
