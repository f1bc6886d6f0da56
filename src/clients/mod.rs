pub mod channel;
pub mod circuit_breaker;
pub mod connectivity;
pub mod log_channel;
pub mod webhook;
