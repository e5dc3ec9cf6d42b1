//! Remote execution channel
//!
//! Jobs are submitted over a channel that can stat, list, upload, download and run commands on
//! the cluster's login node. [`channel::RemoteChannel`] is the capability the orchestrator
//! depends on; [`ssh::SshChannel`] provides it with the system OpenSSH client.

/// The capability trait and its result types
pub mod channel;
/// Explicit connection settings for one cluster
pub mod config;
/// OpenSSH implementation sharing one control connection
pub mod ssh;

#[cfg(test)]
pub(crate) mod mock;
