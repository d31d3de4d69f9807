//! Hostname-routed TCP proxy.
//!
//! ```text
//! Client -> Listener -> Host sniff -> slug -> TargetTable -> local port | node tunnel
//! ```
//!
//! Only the request head is inspected; after that bytes flow through unmodified in both
//! directions.

mod error;
mod forward;
mod listener;
mod sniff;
mod table;

pub use error::ProxyError;
pub use forward::{proxy_bidirectional, ForwardError, ForwardOptions};
pub use listener::{
    resolve_target, Listener, ListenerConfig, ListenerStats, StatsSnapshot,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
};
pub use sniff::{HostSniffer, SniffConfig, SniffResult};
pub use table::{SharedTargetTable, TargetMap, TargetTable};
