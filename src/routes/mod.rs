pub mod analysis;
pub mod health;
pub mod pricing;
pub mod scheduler;
pub mod weather;
