pub mod cards;
pub mod format;
pub mod headless;
pub mod surface;
