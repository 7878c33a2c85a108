pub mod delivery_service;
pub mod gateway;
pub mod health_service;
pub mod history_service;
pub mod lifecycle_service;
pub mod presence;
pub mod projector;
pub mod timers;

#[cfg(test)]
pub(crate) mod testing;
