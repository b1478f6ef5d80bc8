pub mod connection;
pub mod models;
pub mod repositories;
pub mod store;

pub use connection::*;
pub use store::*;
