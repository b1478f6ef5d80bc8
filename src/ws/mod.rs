pub mod models;

mod broadcaster;
mod poll_updates_ws;
mod registry;

pub use broadcaster::Broadcaster;
pub use poll_updates_ws::{SubscriptionSettings, poll_updates_ws};
pub use registry::Registry;
