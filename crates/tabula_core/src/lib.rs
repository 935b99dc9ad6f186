pub mod api;
pub mod clock;
pub mod error;
pub mod filter;
pub mod ids;
pub mod list;
pub mod query;
pub mod record;
pub mod schema;
pub mod sort;
pub mod types;
pub mod value;

pub use api::*;
pub use clock::*;
pub use error::{TabulaError, TabulaResult};
pub use filter::*;
pub use ids::*;
pub use list::*;
pub use query::*;
pub use record::*;
pub use schema::*;
pub use sort::*;
pub use types::*;
pub use value::*;
