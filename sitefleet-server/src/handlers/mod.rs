pub mod engine;
pub mod health;
pub mod sites;
