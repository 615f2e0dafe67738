//! # Equipment Ledger Library
//!
//! Core of the equipment ledger service: movement recording, balance
//! reconciliation, alerting, delivery-note extraction and the HTTP API.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub use migration;
