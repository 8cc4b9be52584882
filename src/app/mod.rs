pub mod audit;
pub mod backfill;
pub mod catalog;
pub mod claim;
pub mod document_store;
pub mod lifecycle;
pub mod model;
pub mod queue;
pub mod runner;
pub mod state;
pub mod status;
pub mod watchdog;
