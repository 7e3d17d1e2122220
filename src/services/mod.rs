//! Business logic services.

pub mod audit_client;
pub mod auth;
pub mod dashboard;
pub mod mail;
pub mod notify;
pub mod poller;
pub mod report;
pub mod score;
pub mod storage;
