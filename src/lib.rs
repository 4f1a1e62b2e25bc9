//! Outreach - campaign audience targeting and multi-channel messaging

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod events;
pub mod funnel;
pub mod ingest;
pub mod integrations;
pub mod messaging;
pub mod reports;
pub mod state_machine;
pub mod targeting;
