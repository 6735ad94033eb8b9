pub mod error;
pub mod config;
pub mod providers;
pub mod request;

use serde::{Deserialize, Serialize};
use std::fmt;

/*

studymate-llm: answer generation adapters for StudyMate.

Two hosted backends, one entry point each:

  providers::huggingface::generate_answer(prompt)
  providers::watsonx::generate_answer(prompt)

Every call resolves its configuration from an environment
snapshot, builds its own client, makes one request and drops
the client again. Nothing is shared between calls.

studymate-llm/
├── src/
│   ├── lib.rs          # Provider enum and re-exports
│   ├── error.rs        # Error type
│   ├── config.rs       # Environment snapshot -> typed config
│   ├── request.rs      # Generation parameters, response shapes
│   └── providers/
│       ├── huggingface.rs
│       └── watsonx.rs
└── tests/              # HTTP clients against a local responder

*/

pub use error::Error;
pub use config::EnvSnapshot;
pub use request::GenerationResponse;

/// Hosted backends an answer can be generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub enum Provider
{   /// Hugging Face Inference API (text-generation task)
    HuggingFace
  , /// IBM watsonx.ai foundation models
    Watsonx
}

impl fmt::Display for Provider
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Provider::HuggingFace => write!(f, "Hugging Face")
          , Provider::Watsonx => write!(f, "watsonx")
        }
    }
}
