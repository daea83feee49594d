pub mod auth;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod history;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod poller;
pub mod rules;
pub mod store;
