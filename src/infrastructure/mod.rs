pub mod config;
pub mod corpus_cache;
pub mod db;
