//! The reconciliation engine: arena, batch stages, cascade and queries.

pub mod aggregate;
pub mod cascade;
pub mod forest;
pub mod history;
pub mod pipeline;
pub mod propagation;
pub mod query;
pub mod reconciler;
pub mod validator;

pub use pipeline::{DeleteReport, ImportReport, TreeService};
