pub mod manager;
pub mod service;

pub use manager::PriorityQueueManager;
pub use service::QueueService;
