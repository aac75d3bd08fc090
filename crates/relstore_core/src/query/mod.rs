//! Query building over EAV channels.
//!
//! - `filter`: typed, composable predicates
//! - `builder`: the [`Select`] builder and field path resolution
//! - `sql`: statement assembly and parameter ordering
//! - `cursor`: result decoding
//!
//! ## Example
//!
//! ```rust,ignore
//! let managed_by_bob = manager
//!     .select("Person")?
//!     .filter(Filter::eq("manager", bob.id().as_ref().unwrap()))
//!     .order_by("name")
//!     .records()?;
//! ```

mod builder;
mod cursor;
mod filter;
mod sql;

pub(crate) use builder::{Restriction, Source};
pub use builder::Select;
pub use cursor::{Cursor, Selected};
pub use filter::{Cast, Collation, CompareOp, Filter, SyncState, TextMatch};
pub use sql::CompiledQuery;
