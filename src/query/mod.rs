//! Structured query options: `$select`/`$expand` trees, filters and
//! ordering, rendered per protocol dialect.

mod filter;
mod orderby;
mod structured;

pub use filter::{ComparisonOp, FilterExpression};
pub use orderby::{Order, OrderBy};
pub use structured::StructuredQuery;
