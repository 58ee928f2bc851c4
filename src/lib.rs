pub mod adapters;
pub mod cache;
pub mod calculator;
pub mod calendar;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod http;
pub mod invalidation;
pub mod metrics;
pub mod repo;
pub mod schedule;
pub mod time;
pub mod workers;
pub mod zone;
