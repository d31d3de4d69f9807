pub mod admin;
pub mod config;
pub mod persistence;
pub mod proxy;
pub mod sync;

pub use proxy::{
    resolve_target, HostSniffer, Listener, ListenerConfig, ListenerStats, ProxyError,
    SharedTargetTable, SniffConfig, SniffResult, StatsSnapshot, TargetMap, TargetTable,
};
