//! Durable storage of the forest and its history.

pub mod sqlite;

pub use sqlite::{TreeStore, TreeTx};
