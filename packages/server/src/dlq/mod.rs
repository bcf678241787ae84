mod service;

pub use service::{DlqService, ResolveResult, dlq_service};
