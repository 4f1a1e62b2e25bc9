//! Campaign state machine - lifecycle transitions for campaigns and targets

mod lifecycle;
mod machine;
mod transitions;

pub use lifecycle::*;
pub use machine::*;
pub use transitions::*;
