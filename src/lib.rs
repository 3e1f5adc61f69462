pub mod document;
pub mod embeddings;
pub mod generator;
pub mod inference;
pub mod preprocessing;
pub mod questions;
pub mod rag;
pub mod store;
