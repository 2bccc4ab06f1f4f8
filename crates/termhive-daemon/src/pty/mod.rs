pub mod manager;
pub mod output;
