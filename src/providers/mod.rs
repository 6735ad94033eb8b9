//! Answer generation adapters, one per hosted backend

pub mod huggingface;
pub mod watsonx;

// Re-export for convenience
pub use huggingface::{HuggingFaceClient, TextGeneration};
pub use watsonx::{ModelInference, WatsonxModel, WatsonxModelSpec};
