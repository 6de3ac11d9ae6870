pub mod auth_service;
pub mod gateway;
pub mod health_service;
pub mod key_service;
pub mod message_service;
pub mod push_token_service;
pub mod registry;
