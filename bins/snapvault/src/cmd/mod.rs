pub mod config;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod query;
pub mod run;
