pub mod audit;
pub mod cache;
pub mod config;
pub mod daily;
pub mod enrich;
pub mod header;
pub mod identity;
pub mod markdown;
pub mod paths;
pub mod pipeline;
pub mod record;
pub mod router;
pub mod tracker;
pub mod util;
pub mod warn;
pub mod writer;
