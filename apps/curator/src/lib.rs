pub mod config;
pub mod mcp_client;
pub mod prompt;
pub mod report;
pub mod research;
