pub mod attendance;
pub mod core;
pub mod exchange;
pub mod filters;
pub mod grid;
pub mod roster;
