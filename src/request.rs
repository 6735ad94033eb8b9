//! Generation parameters and response shapes for both backends

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ===== Hugging Face =====

/// `parameters` object of a text-generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationParams
{   pub max_new_tokens: u32
  , pub temperature: f64
  , pub top_p: f64
  , /// Sampling is enabled only for a positive temperature
    pub do_sample: bool
  , /// Only newly generated text is returned, never the prompt
    pub return_full_text: bool
}

impl TextGenerationParams
{   pub fn from_config(config: &crate::config::HuggingFaceConfig) -> Self
    {   TextGenerationParams
        {   max_new_tokens: config.max_new_tokens
          , temperature: config.temperature
          , top_p: config.top_p
          , do_sample: config.temperature > 0.0
          , return_full_text: false
        }
    }
}

// ===== watsonx =====

/// Token selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMethod
{   Greedy
  , Sample
}

/// Generation parameters sent with a watsonx request.
///
/// `decoding_method` is always greedy, so `temperature` and `top_p`
/// are carried but have no effect on the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatsonxParams
{   pub decoding_method: DecodingMethod
  , pub max_new_tokens: u32
  , pub temperature: f64
  , pub top_p: f64
  , pub repetition_penalty: f64
}

impl WatsonxParams
{   pub fn from_config(config: &crate::config::WatsonxConfig) -> Self
    {   WatsonxParams
        {   decoding_method: DecodingMethod::Greedy
          , max_new_tokens: config.max_new_tokens
          , temperature: config.temperature
          , top_p: config.top_p
          , repetition_penalty: config.repetition_penalty
        }
    }
}

/// What a watsonx generation call hands back: a JSON object or
/// plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResponse
{   Structured(Map<String, Value>)
  , Text(String)
}

impl GenerationResponse
{   /// Classify a raw response body
    pub fn from_body(body: String) -> Self
    {   match serde_json::from_str::<Map<String, Value>>(&body)
        {   Ok(map) => GenerationResponse::Structured(map)
          , Err(_) => GenerationResponse::Text(body)
        }
    }

    /// `results[0].generated_text` for structured responses, empty
    /// when that path is absent. Text is returned unchanged.
    pub fn into_text(self) -> String
    {   match self
        {   GenerationResponse::Structured(map) => map
              .get("results")
              .and_then(|results| results.get(0))
              .and_then(|first| first.get("generated_text"))
              .and_then(Value::as_str)
              .unwrap_or_default()
              .to_string()
          , GenerationResponse::Text(text) => text
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn structured(value: Value) -> GenerationResponse
    {   match value
        {   Value::Object(map) => GenerationResponse::Structured(map)
          , other => panic!("not an object: {}", other)
        }
    }

    #[test]
    fn first_result_text_is_extracted()
    {   let response = structured(json!({
          "results": [
            { "generated_text": "X", "stop_reason": "eos_token" }
          , { "generated_text": "ignored" }
          ]
        }));
        assert_eq!(response.into_text(), "X");
    }

    #[test]
    fn missing_results_yield_empty_text()
    {   assert_eq!(structured(json!({ "results": [] })).into_text(), "");
        assert_eq!(structured(json!({})).into_text(), "");
        assert_eq!(
          structured(json!({ "results": [{}] })).into_text(),
          ""
        );
    }

    #[test]
    fn plain_text_passes_through()
    {   assert_eq!(
          GenerationResponse::Text("Y".to_string()).into_text(),
          "Y"
        );
    }

    #[test]
    fn body_classification()
    {   assert_eq!(
          GenerationResponse::from_body(
            r#"{"results":[{"generated_text":"Z"}]}"#.to_string()
          ).into_text(),
          "Z"
        );
        assert_eq!(
          GenerationResponse::from_body("just words".to_string()),
          GenerationResponse::Text("just words".to_string())
        );
        // A JSON array is not a mapping
        assert_eq!(
          GenerationResponse::from_body("[1]".to_string()),
          GenerationResponse::Text("[1]".to_string())
        );
    }

    #[test]
    fn watsonx_params_use_wire_names()
    {   let params = WatsonxParams
        {   decoding_method: DecodingMethod::Greedy
          , max_new_tokens: 512
          , temperature: 0.5
          , top_p: 0.5
          , repetition_penalty: 1.5
        };
        assert_eq!(
          serde_json::to_value(&params).unwrap(),
          json!({
            "decoding_method": "greedy"
          , "max_new_tokens": 512
          , "temperature": 0.5
          , "top_p": 0.5
          , "repetition_penalty": 1.5
          })
        );
    }
}
