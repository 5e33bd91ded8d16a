pub mod config;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod models;
pub mod notifications;
pub mod observability;
pub mod repositories;
pub mod services;
