mod common;
mod content;
mod dlq;
mod health;
mod text_store;
