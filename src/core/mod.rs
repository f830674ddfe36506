pub mod cycle;
pub mod decision;
pub mod engine;
pub mod ledger;
pub mod router;
pub mod sweeper;
