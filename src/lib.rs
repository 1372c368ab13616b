//! ODDSDESK: live casino odds, wallet ledger and bet settlement.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod feeds;
pub mod betslip;
pub mod poller;
pub mod mirror;
pub mod ledger;
pub mod wallet;
pub mod settlement;
pub mod simulation;
pub mod gateway;
pub mod storage;
