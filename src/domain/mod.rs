//! Domain models for the outreach engine

mod campaign;
mod error;
mod funnel;
mod message;
mod report;
mod signal;
mod state;
mod target;

pub use campaign::*;
pub use error::*;
pub use funnel::*;
pub use message::*;
pub use report::*;
pub use signal::*;
pub use state::*;
pub use target::*;
