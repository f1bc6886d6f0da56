pub mod circuit_breaker;
pub mod dead_letter;
pub mod health;
pub mod notification;
pub mod priority;
pub mod queue;
pub mod response;
pub mod retry;
pub mod status;
pub mod validation;
