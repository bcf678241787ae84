pub mod content;
pub mod dlq;
pub mod health;
pub mod shared;
