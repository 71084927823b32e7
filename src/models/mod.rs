pub mod activity;
pub mod entry;
pub mod user;
