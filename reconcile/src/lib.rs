pub mod config;
pub mod error;
pub mod identifier_csv;
pub mod pipeline;
pub mod reconciliation_client;
pub mod response_cache;
pub mod result_table;
pub mod sparql;
pub mod sparql_endpoint;
pub mod wikidata;
