use serde::{Deserialize, Serialize};
use log::{debug, trace, error};
use std::time::Duration;

use crate::config::{EnvSnapshot, HuggingFaceConfig};
use crate::error::Error;
use crate::request::TextGenerationParams;

const HF_API_BASE: &str
  = "https://api-inference.huggingface.co";

/// Returned when `HF_API_TOKEN` is not configured
pub const UNAVAILABLE_MESSAGE: &str
  = "[LLM unavailable] Provide HF_API_TOKEN in your environment to enable answers.";

/// Prefix of the answer returned when a request fails
pub const ERROR_PREFIX: &str = "[LLM error]";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize)]
pub struct TextGenerationRequest<'a>
{   pub inputs: &'a str
  , pub parameters: &'a TextGenerationParams
  , pub stream: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedText
{   pub generated_text: String
}

/// The Inference API answers with a list; text-generation-inference
/// servers answer with a single object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextGenerationResponse
{   Many(Vec<GeneratedText>)
  , One(GeneratedText)
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody
{   error: String
}

// ===== Client =====

/// Something that can run a text-generation request
#[allow(async_fn_in_trait)]
pub trait TextGeneration
{   async fn text_generation(
      &self
    , prompt: &str
    , params: &TextGenerationParams
    ) -> Result<String, Error>;
}

/// Inference API client bound to one model and token
pub struct HuggingFaceClient
{   model_id: String
  , api_token: String
  , api_base: String
  , http_client: reqwest::Client
}

impl HuggingFaceClient
{   pub fn new(config: &HuggingFaceConfig) -> Result<Self, Error>
    {   Self::with_api_base(config, HF_API_BASE)
    }

    /// Client talking to a custom endpoint, e.g. a dedicated
    /// inference endpoint or a local test server
    pub fn with_api_base(
      config: &HuggingFaceConfig
    , api_base: impl Into<String>
    ) -> Result<Self, Error>
    {   debug!("Creating HuggingFaceClient for {}", config.model_id);
        let http_client = reqwest::Client::builder()
          .timeout(Duration::from_secs(config.timeout_secs))
          .build()
          .map_err(|e| {
            error!("Cannot build HTTP client: {}", e);
            Error::HttpError(e.to_string())
          })?;
        Ok(HuggingFaceClient
        {   model_id: config.model_id.clone()
          , api_token: config.api_token.clone()
          , api_base: api_base.into()
          , http_client
        })
    }

    pub fn model_id(&self) -> &str
    {   &self.model_id
    }
}

impl TextGeneration for HuggingFaceClient
{   async fn text_generation(
      &self
    , prompt: &str
    , params: &TextGenerationParams
    ) -> Result<String, Error>
    {   let request = TextGenerationRequest
        {   inputs: prompt
          , parameters: params
          , stream: false
        };
        trace!("Hugging Face request: {:?}", request);

        let response = self.http_client
          .post(format!(
            "{}/models/{}",
            self.api_base.trim_end_matches('/'),
            self.model_id
          ))
          .bearer_auth(&self.api_token)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        trace!("Hugging Face response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            let message = serde_json::from_str::<ApiErrorBody>(&error_text)
              .map(|body| body.error)
              .unwrap_or(error_text);
            error!("Hugging Face API error: {}", message);
            return Err(Error::ApiError
            {   provider: crate::Provider::HuggingFace
              , message: format!("{}: {}", status, message)
            });
        }

        let generation: TextGenerationResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })?;

        match generation
        {   TextGenerationResponse::One(one) => Ok(one.generated_text)
          , TextGenerationResponse::Many(many) => many
              .into_iter()
              .next()
              .map(|g| g.generated_text)
              .ok_or_else(|| {
                error!("No generations in response");
                Error::EmptyResponse(crate::Provider::HuggingFace)
              })
        }
    }
}

// ===== Adapter =====

/// Answer `prompt` with the Hugging Face backend configured in the
/// process environment.
///
/// Missing credentials and request failures come back as answer
/// text. Only a malformed numeric variable, or an HTTP client that
/// cannot be built, is returned as `Err`.
pub async fn generate_answer(prompt: &str) -> Result<String, Error>
{   generate_answer_with(
      &EnvSnapshot::from_process(),
      prompt,
      HuggingFaceClient::new
    ).await
}

/// Same as [`generate_answer`] with the environment and client
/// construction supplied by the caller. `connect` runs only when a
/// token is configured.
pub async fn generate_answer_with<C, F>(
  env: &EnvSnapshot
, prompt: &str
, connect: F
) -> Result<String, Error>
where
  C: TextGeneration
, F: FnOnce(&HuggingFaceConfig) -> Result<C, Error>
{   let config = match HuggingFaceConfig::resolve(env)?
    {   Some(config) => config
      , None => return Ok(UNAVAILABLE_MESSAGE.to_string())
    };

    let client = connect(&config)?;
    let params = TextGenerationParams::from_config(&config);
    debug!(
      "Generating with {} (do_sample={})",
      config.model_id, params.do_sample
    );

    match client.text_generation(prompt, &params).await
    {   Ok(text) => Ok(text)
      , Err(e) => {
          error!("Hugging Face generation failed: {}", e);
          Ok(format!("{} {}", ERROR_PREFIX, e))
        }
    }
}
