pub mod pipeline;
pub mod scorer;
pub mod types;
