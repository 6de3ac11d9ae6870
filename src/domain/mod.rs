pub mod auth;
pub mod frame;
pub mod keys;
pub mod message;
pub mod user;
