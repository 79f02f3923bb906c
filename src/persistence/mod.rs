pub mod autosave;
pub mod password;
pub mod record;
pub mod store;
