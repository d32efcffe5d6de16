//! Page queries built from chained filters.
//!
//! A [`QueryBuilder`] collects filter fragments and renders them into query
//! text. Running the query is left to a [`QueryStore`].

mod builder;
mod error;
pub mod filter;
mod sample;

pub use builder::{Query, QueryBuilder, QueryStore};
pub use error::{QueryError, StoreError};
pub use filter::{IntOp, RefOp, TextFilter, TextOp};
pub use sample::sample;
