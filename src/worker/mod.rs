//! Offline worker: cache lifecycle, fetch interception and the control channel.
//!
//! [`WorkerController`] holds all the policy and talks to a [`CacheStore`] and
//! a [`Network`]. [`Registration`] and [`EventLoop`] are the platform glue that
//! decide which controller is active and feed it events.
//!
//! [`CacheStore`]: crate::cache::CacheStore

mod controller;
mod events;
mod fallback;
mod lifecycle;
mod message;
mod network;
mod notification;
mod rules;

pub use controller::{Served, WorkerController};
pub use events::{EventLoop, WorkerEvent};
pub use lifecycle::Registration;
pub use network::{HttpNetwork, Network};
pub use rules::DynamicCacheRule;

#[cfg(test)]
pub(crate) use network::FakeNetwork;
