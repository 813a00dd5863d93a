pub mod analysis;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod transform;
