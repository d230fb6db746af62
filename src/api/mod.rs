//! Versioned request dispatch
//!
//! Every storage service registers its handlers here at startup, one per
//! (operation, version) pair, and every request goes through [`Dispatcher`].

pub mod dispatcher;
pub mod registry;
pub mod version;

pub use dispatcher::Dispatcher;
pub use registry::{Handler, Registry};
pub use version::{ApiVersion, Stability};
