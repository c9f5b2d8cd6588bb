pub mod adapters;
pub mod chargeback;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod events;
pub mod notify;
pub mod ports;
pub mod saga;
pub mod screening;
pub mod services;
pub mod startup;
