//! Automated remediation of static-analysis findings: scan the issue
//! tracker for an unhandled finding, draft and apply a fix on a fresh
//! branch, publish a review request, and record the result.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod ledger;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod tracker;
pub mod workspace;
