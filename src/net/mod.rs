pub mod connection;
pub mod line;
pub mod login_flow;
pub mod registry;
pub mod server;
pub mod telnet;
