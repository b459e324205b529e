pub mod exchange;
pub mod postgres;

pub use exchange::{HttpGameDiscovery, HttpMarketClient};
pub use postgres::Store;
