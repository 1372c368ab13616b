//! End-to-end tests: mock feed, gateway, HTTP clients and ledger together.

mod mock_feed;
mod settlement_flow;
