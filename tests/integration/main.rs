//! Integration tests

mod e2e_test;
mod ledger_test;
mod orchestrator_test;
