pub mod conversation;
pub mod gateway;
pub mod group;
pub mod message;
pub mod user;
