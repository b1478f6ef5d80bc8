pub mod poll_repository;

pub use poll_repository::*;
