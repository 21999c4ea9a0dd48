pub mod hooks;
pub mod meta;
pub mod users;
