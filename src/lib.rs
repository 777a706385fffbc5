//! herdscout - cattle farm contact discovery crawler.
//!
//! Search queries and directory listings seed a persistent URL frontier.
//! A pool of workers claims URLs, fetches them, extracts farm contacts and
//! merges them into a deduplicated contact store.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod server;
pub mod services;
