pub mod analytics;
pub mod attendance;
pub mod core;
pub mod events;
pub mod roster;
