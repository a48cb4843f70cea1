pub mod postgres;

pub use postgres::PostgresSiteStore;
