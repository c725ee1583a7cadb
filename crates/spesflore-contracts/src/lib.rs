pub mod botany;
pub mod errors;
pub mod events;
pub mod models;
pub mod query;
pub mod schema;
pub mod surface;
