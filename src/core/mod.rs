pub mod coordinator;
pub mod models;
pub mod notifications;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod store;
