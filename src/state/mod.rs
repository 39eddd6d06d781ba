pub mod change_tracker;
pub mod scroll;
pub mod store;
