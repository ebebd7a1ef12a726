//! A thin client for the airport Flight RPC server: connection setup plus
//! the scan/write/transaction wrappers around the generated
//! `FlightServiceClient`.

pub mod client;
pub mod connection;

pub use client::flight;
