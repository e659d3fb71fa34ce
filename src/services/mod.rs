pub mod ai;
pub mod alerts;
pub mod analysis;
pub mod dashboard;
pub mod enthalpy;
pub mod history;
pub mod notify;
pub mod pricing;
pub mod reminders;
pub mod rules;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod weather_chain;
