pub mod attendance;
pub mod auth;
pub mod core;
pub mod messages;
pub mod students;
