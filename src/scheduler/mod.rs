pub mod core;
pub mod hooks;
pub mod pulse;
