pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod form;
pub mod model;
pub mod output;
pub mod store;
pub mod transfer;

#[cfg(test)]
mod tests;
