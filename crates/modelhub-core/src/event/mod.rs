//! Event distribution for hub observability.

pub mod bus;

pub use bus::EventBus;
