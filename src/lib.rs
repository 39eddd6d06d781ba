//! Live trading dashboard that redraws only what changed between polls.
//!
//! Each poll cycle fetches a full [`Snapshot`](market_data::types::Snapshot)
//! of the backend; [`DashboardSession`](session::DashboardSession) hands it
//! to one [`ReconciliationEngine`](engine::ReconciliationEngine) per panel,
//! which patches a [`Surface`](render::surface::Surface) in place, flashes the
//! fields whose formatted value changed, and keeps the viewer's scroll
//! position.

pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod metrics;
pub mod render;
pub mod session;
pub mod state;
