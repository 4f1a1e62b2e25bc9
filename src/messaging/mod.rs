//! Outbound messaging: job building, rendering and dispatch
//!
//! - `builder`: queues one job per (target, channel)
//! - `render`: turns a campaign into channel payloads
//! - `dispatcher`: claims and sends queued jobs through the channel transports

pub mod builder;
pub mod dispatcher;
pub mod render;

pub use builder::{build_messages, reset_failed_messages};
pub use dispatcher::{DispatchLocks, Dispatcher};
pub use render::{campaign_link, render_template, MessageRenderer, RenderedMessage, TemplateContext};
