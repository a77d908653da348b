pub mod market;

pub use market::{PageResult, QueryOptions, SortKey, SortOrder, Token};
