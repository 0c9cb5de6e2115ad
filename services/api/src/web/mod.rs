pub mod rest;
pub mod state;

pub use rest::{router, ApiDoc};
