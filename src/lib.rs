pub mod accumulator;
pub mod aggregator;
pub mod config;
pub mod errors;
pub mod http_client;
pub mod legs;
pub mod qp_rules;
pub mod recap;
pub mod season;
pub mod turn_cache;
pub mod turn_parser;
pub mod turn_store;
