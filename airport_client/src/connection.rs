//! Re-exports [`client_util`]'s connection builder under the name the
//! teacher's client crates use at their call sites.

pub use client_util::{Builder, Connection, ConnectionError};
