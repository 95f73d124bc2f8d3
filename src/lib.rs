pub mod config;
pub mod discover;
pub mod enrich;
pub mod fetch;
pub mod load;
pub mod merge;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod table;
pub mod write;
