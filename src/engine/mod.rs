pub mod entity;
pub mod reconcile;

pub use entity::Entity;
pub use reconcile::{ApplyReport, Mode, ReconciliationEngine};
