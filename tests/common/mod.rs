//! Integration test common infrastructure.
//!
//! Spawns the built binary against a local fake trace endpoint, with shell
//! commands standing in for the VPN client and the firewall.

pub mod server;
pub mod trace;

#[allow(unused_imports)]
pub use server::{ServerOptions, TestServer};
#[allow(unused_imports)]
pub use trace::FakeTrace;
