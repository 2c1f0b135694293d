pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod ledger;
pub mod model;
pub mod subjects;
pub mod submit;
pub mod workload;

#[cfg(test)]
mod tests;
