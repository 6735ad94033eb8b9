//! Configuration for the answer generation backends
//!
//! Every value comes from an [`EnvSnapshot`]. Resolution is a pure
//! function of the snapshot, so tests build one from literal pairs
//! instead of touching the process environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use log::{debug, error};

// ===== Variable names =====

pub const HF_TEXT_GEN_MODEL: &str = "HF_TEXT_GEN_MODEL";
pub const HF_API_TOKEN: &str = "HF_API_TOKEN";
pub const HF_MAX_NEW_TOKENS: &str = "HF_MAX_NEW_TOKENS";
pub const HF_TEMPERATURE: &str = "HF_TEMPERATURE";
pub const HF_TOP_P: &str = "HF_TOP_P";

pub const IBM_WATSONX_MODEL_ID: &str = "IBM_WATSONX_MODEL_ID";
pub const IBM_WATSONX_PROJECT_ID: &str = "IBM_WATSONX_PROJECT_ID";
pub const IBM_WATSONX_SPACE_ID: &str = "IBM_WATSONX_SPACE_ID";
pub const IBM_WATSONX_API_KEY: &str = "IBM_WATSONX_API_KEY";
pub const IBM_WATSONX_URL: &str = "IBM_WATSONX_URL";
pub const WATSONX_MAX_NEW_TOKENS: &str = "WATSONX_MAX_NEW_TOKENS";
pub const WATSONX_TEMPERATURE: &str = "WATSONX_TEMPERATURE";
pub const WATSONX_TOP_P: &str = "WATSONX_TOP_P";
pub const WATSONX_REPETITION_PENALTY: &str
  = "WATSONX_REPETITION_PENALTY";

// ===== Defaults =====

pub const DEFAULT_HF_MODEL: &str
  = "mistralai/Mixtral-8x7B-Instruct-v0.1";
pub const DEFAULT_WATSONX_MODEL: &str
  = "mistralai/mixtral-8x7b-instruct-v01";
pub const DEFAULT_WATSONX_URL: &str
  = "https://us-south.ml.cloud.ibm.com";

/// Request timeout for the Hugging Face client, in seconds
pub const HF_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_REPETITION_PENALTY: f64 = 1.1;

// ===== Environment snapshot =====

/// Immutable view of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot
{   vars: HashMap<String, String>
}

impl EnvSnapshot
{   /// Capture the current process environment.
    /// Variables that are not valid unicode are skipped.
    pub fn from_process() -> Self
    {   let vars = std::env::vars_os()
          .filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
          })
          .collect();
        EnvSnapshot { vars }
    }

    /// Build a snapshot from explicit name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
      I: IntoIterator<Item = (K, V)>
    , K: Into<String>
    , V: Into<String>
    {   EnvSnapshot
        {   vars: pairs
              .into_iter()
              .map(|(k, v)| (k.into(), v.into()))
              .collect()
        }
    }

    /// Raw value, `None` when unset
    pub fn get(&self, name: &str) -> Option<&str>
    {   self.vars.get(name).map(String::as_str)
    }

    /// Value or `default` when unset. A set but empty value is kept.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str
    {   self.get(name).unwrap_or(default)
    }

    /// Value when set and non-empty
    pub fn non_empty(&self, name: &str) -> Option<&str>
    {   self.get(name).filter(|v| !v.is_empty())
    }

    /// Parse a variable, falling back to `default` when unset
    pub fn parse_or<T>(&self, name: &str, default: T)
      -> Result<T, crate::error::Error>
    where
      T: FromStr
    , T::Err: Display
    {   match self.get(name)
        {   None => Ok(default)
          , Some(raw) => raw.trim().parse::<T>().map_err(|e| {
              error!("Cannot parse {}={:?}: {}", name, raw, e);
              crate::error::Error::InvalidConfiguration(
                format!("{}={:?}: {}", name, raw, e)
              )
            })
        }
    }
}

// ===== Hugging Face =====

/// Resolved configuration for the Hugging Face backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HuggingFaceConfig
{   /// Model repository id
    pub model_id: String
  , #[serde(skip_serializing)]
    pub api_token: String
  , /// Request timeout in seconds
    pub timeout_secs: u64
  , pub max_new_tokens: u32
  , pub temperature: f64
  , pub top_p: f64
}

impl fmt::Debug for HuggingFaceConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("HuggingFaceConfig")
          .field("model_id", &self.model_id)
          .field("api_token", &"<redacted>")
          .field("timeout_secs", &self.timeout_secs)
          .field("max_new_tokens", &self.max_new_tokens)
          .field("temperature", &self.temperature)
          .field("top_p", &self.top_p)
          .finish()
    }
}

impl HuggingFaceConfig
{   /// Resolve from a snapshot.
    ///
    /// `Ok(None)` when `HF_API_TOKEN` is unset or empty; the
    /// generation parameters are not looked at in that case.
    pub fn resolve(env: &EnvSnapshot)
      -> Result<Option<Self>, crate::error::Error>
    {   let model_id = env
          .get_or(HF_TEXT_GEN_MODEL, DEFAULT_HF_MODEL)
          .to_string();

        let api_token = match env.non_empty(HF_API_TOKEN)
        {   Some(token) => token.to_string()
          , None => {
              debug!("{} not set, Hugging Face unavailable", HF_API_TOKEN);
              return Ok(None);
            }
        };

        let config = HuggingFaceConfig
        {   model_id
          , api_token
          , timeout_secs: HF_TIMEOUT_SECS
          , max_new_tokens: env
              .parse_or(HF_MAX_NEW_TOKENS, DEFAULT_MAX_NEW_TOKENS)?
          , temperature: env
              .parse_or(HF_TEMPERATURE, DEFAULT_TEMPERATURE)?
          , top_p: env.parse_or(HF_TOP_P, DEFAULT_TOP_P)?
        };
        debug!("Resolved Hugging Face config for {}", config.model_id);
        Ok(Some(config))
    }
}

// ===== watsonx =====

/// Deployment scope a watsonx model runs under.
/// Serializes as a single `project_id` or `space_id` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope
{   #[serde(rename = "project_id")]
    Project(String)
  , #[serde(rename = "space_id")]
    Space(String)
}

impl Scope
{   /// Project id wins when both are present
    pub fn resolve(env: &EnvSnapshot) -> Option<Scope>
    {   if let Some(project_id) = env.non_empty(IBM_WATSONX_PROJECT_ID)
        {   return Some(Scope::Project(project_id.to_string()));
        }
        env.non_empty(IBM_WATSONX_SPACE_ID)
          .map(|space_id| Scope::Space(space_id.to_string()))
    }
}

/// Resolved configuration for the watsonx backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct WatsonxConfig
{   pub model_id: String
  , #[serde(skip_serializing)]
    pub api_key: String
  , /// Service endpoint, e.g. the us-south region
    pub url: String
  , pub scope: Scope
  , pub max_new_tokens: u32
  , pub temperature: f64
  , pub top_p: f64
  , pub repetition_penalty: f64
}

impl fmt::Debug for WatsonxConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("WatsonxConfig")
          .field("model_id", &self.model_id)
          .field("api_key", &"<redacted>")
          .field("url", &self.url)
          .field("scope", &self.scope)
          .field("max_new_tokens", &self.max_new_tokens)
          .field("temperature", &self.temperature)
          .field("top_p", &self.top_p)
          .field("repetition_penalty", &self.repetition_penalty)
          .finish()
    }
}

impl WatsonxConfig
{   /// Resolve from a snapshot.
    ///
    /// `Ok(None)` when the API key, the service URL or the scope is
    /// missing; the generation parameters are not looked at then.
    pub fn resolve(env: &EnvSnapshot)
      -> Result<Option<Self>, crate::error::Error>
    {   let api_key = env.non_empty(IBM_WATSONX_API_KEY);
        let url = Some(env.get_or(IBM_WATSONX_URL, DEFAULT_WATSONX_URL))
          .filter(|u| !u.is_empty());
        let scope = Scope::resolve(env);

        let (api_key, url, scope) = match (api_key, url, scope)
        {   (Some(k), Some(u), Some(s)) => (k, u, s)
          , _ => {
              debug!("watsonx credentials incomplete, unavailable");
              return Ok(None);
            }
        };

        let config = WatsonxConfig
        {   model_id: env
              .get_or(IBM_WATSONX_MODEL_ID, DEFAULT_WATSONX_MODEL)
              .to_string()
          , api_key: api_key.to_string()
          , url: url.to_string()
          , scope
          , max_new_tokens: env
              .parse_or(WATSONX_MAX_NEW_TOKENS, DEFAULT_MAX_NEW_TOKENS)?
          , temperature: env
              .parse_or(WATSONX_TEMPERATURE, DEFAULT_TEMPERATURE)?
          , top_p: env.parse_or(WATSONX_TOP_P, DEFAULT_TOP_P)?
          , repetition_penalty: env.parse_or(
              WATSONX_REPETITION_PENALTY,
              DEFAULT_REPETITION_PENALTY
            )?
        };
        debug!(
          "Resolved watsonx config for {} at {}",
          config.model_id, config.url
        );
        Ok(Some(config))
    }
}
