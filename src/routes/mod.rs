pub mod admin;
pub mod events;
pub mod lending;
pub mod public;
