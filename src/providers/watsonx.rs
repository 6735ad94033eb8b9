use serde::{Deserialize, Serialize};
use log::{debug, trace, error};
use std::fmt;

use crate::config::{EnvSnapshot, Scope, WatsonxConfig};
use crate::error::Error;
use crate::request::{GenerationResponse, WatsonxParams};

const IBM_IAM_TOKEN_URL: &str
  = "https://iam.cloud.ibm.com/identity/token";
const IAM_APIKEY_GRANT: &str
  = "urn:ibm:params:oauth:grant-type:apikey";
const WATSONX_API_VERSION: &str = "2023-05-29";

/// Returned when the API key, URL or scope is not configured
pub const UNAVAILABLE_MESSAGE: &str
  = "[LLM unavailable] Please configure IBM watsonx credentials to enable answer generation.";

// ===== Model spec =====

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials
{   pub api_key: String
  , pub url: String
}

impl fmt::Debug for Credentials
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("Credentials")
          .field("api_key", &"<redacted>")
          .field("url", &self.url)
          .finish()
    }
}

/// Everything needed to build a model handle
#[derive(Debug, Clone, PartialEq)]
pub struct WatsonxModelSpec
{   pub model_id: String
  , pub params: WatsonxParams
  , pub credentials: Credentials
  , pub scope: Scope
}

pub fn model_spec(config: &WatsonxConfig) -> WatsonxModelSpec
{   WatsonxModelSpec
    {   model_id: config.model_id.clone()
      , params: WatsonxParams::from_config(config)
      , credentials: Credentials
        {   api_key: config.api_key.clone()
          , url: config.url.clone()
        }
      , scope: config.scope.clone()
    }
}

/// Model spec for the given environment, `None` when credentials are
/// incomplete
pub fn get_watsonx_model_spec(env: &EnvSnapshot)
  -> Result<Option<WatsonxModelSpec>, Error>
{   Ok(WatsonxConfig::resolve(env)?.as_ref().map(model_spec))
}

// ===== Message Types =====

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a>
{   pub model_id: &'a str
  , pub input: &'a str
  , pub parameters: &'a WatsonxParams
  , #[serde(flatten)]
    pub scope: &'a Scope
}

#[derive(Debug, Clone, Deserialize)]
struct IamTokenResponse
{   access_token: String
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody
{   errors: Vec<ApiErrorItem>
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorItem
{   message: String
}

// ===== Model handle =====

/// Something that can generate text for a prompt
#[allow(async_fn_in_trait)]
pub trait ModelInference
{   async fn generate_text(&self, prompt: &str)
      -> Result<GenerationResponse, Error>;
}

/// Foundation model handle bound to one spec
pub struct WatsonxModel
{   spec: WatsonxModelSpec
  , iam_url: String
  , http_client: reqwest::Client
}

impl WatsonxModel
{   pub fn new(spec: WatsonxModelSpec) -> Self
    {   Self::with_iam_url(spec, IBM_IAM_TOKEN_URL)
    }

    /// Model that exchanges its API key at a custom IAM endpoint
    pub fn with_iam_url(
      spec: WatsonxModelSpec
    , iam_url: impl Into<String>
    ) -> Self
    {   debug!("Creating WatsonxModel for {}", spec.model_id);
        WatsonxModel
        {   spec
          , iam_url: iam_url.into()
          , http_client: reqwest::Client::new()
        }
    }

    pub fn spec(&self) -> &WatsonxModelSpec
    {   &self.spec
    }

    /// Exchange the API key for an IAM bearer token
    async fn access_token(&self) -> Result<String, Error>
    {   debug!("Requesting IAM token");
        let response = self.http_client
          .post(&self.iam_url)
          .header("Accept", "application/json")
          .form(&[
            ("grant_type", IAM_APIKEY_GRANT)
          , ("apikey", self.spec.credentials.api_key.as_str())
          ])
          .send()
          .await
          .map_err(|e| {
            error!("IAM HTTP error: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        trace!("IAM response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            error!("IAM token exchange failed: {}", error_text);
            return Err(Error::ApiError
            {   provider: crate::Provider::Watsonx
              , message: format!(
                  "IAM token exchange {}: {}", status, error_text
                )
            });
        }

        let token: IamTokenResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })?;
        Ok(token.access_token)
    }
}

impl ModelInference for WatsonxModel
{   async fn generate_text(&self, prompt: &str)
      -> Result<GenerationResponse, Error>
    {   let token = self.access_token().await?;

        let request = GenerationRequest
        {   model_id: &self.spec.model_id
          , input: prompt
          , parameters: &self.spec.params
          , scope: &self.spec.scope
        };
        trace!("watsonx request: {:?}", request);

        let response = self.http_client
          .post(format!(
            "{}/ml/v1/text/generation",
            self.spec.credentials.url.trim_end_matches('/')
          ))
          .query(&[("version", WATSONX_API_VERSION)])
          .bearer_auth(token)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        trace!("watsonx response status: {}", status);

        let body = response.text().await.map_err(|e| {
          error!("Cannot read response body: {}", e);
          Error::from(e)
        })?;

        if !status.is_success()
        {   let message = serde_json::from_str::<ApiErrorBody>(&body)
              .ok()
              .and_then(|b| b.errors.into_iter().next())
              .map(|item| item.message)
              .unwrap_or(body);
            error!("watsonx API error: {}", message);
            return Err(Error::ApiError
            {   provider: crate::Provider::Watsonx
              , message: format!("{}: {}", status, message)
            });
        }

        Ok(GenerationResponse::from_body(body))
    }
}

// ===== Adapter =====

/// Answer `prompt` with the watsonx model configured in the process
/// environment.
///
/// Missing credentials come back as answer text. Request failures
/// are returned as `Err` for the caller to handle.
pub async fn generate_answer(prompt: &str) -> Result<String, Error>
{   generate_answer_with(
      &EnvSnapshot::from_process(),
      prompt,
      |spec| Ok(WatsonxModel::new(spec))
    ).await
}

/// Same as [`generate_answer`] with the environment and model
/// construction supplied by the caller. `connect` runs only when
/// credentials are complete.
pub async fn generate_answer_with<M, F>(
  env: &EnvSnapshot
, prompt: &str
, connect: F
) -> Result<String, Error>
where
  M: ModelInference
, F: FnOnce(WatsonxModelSpec) -> Result<M, Error>
{   let spec = match get_watsonx_model_spec(env)?
    {   Some(spec) => spec
      , None => return Ok(UNAVAILABLE_MESSAGE.to_string())
    };

    debug!("Generating with {}", spec.model_id);
    let model = connect(spec)?;
    let response = model.generate_text(prompt).await?;
    Ok(response.into_text())
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::config::*;
    use crate::request::DecodingMethod;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    struct FakeModel<'a>
    {   prompts: &'a RefCell<Vec<String>>
      , reply: Result<GenerationResponse, Error>
    }

    impl ModelInference for FakeModel<'_>
    {   async fn generate_text(&self, prompt: &str)
          -> Result<GenerationResponse, Error>
        {   self.prompts.borrow_mut().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn credentials(extra: &[(&'static str, &'static str)]) -> EnvSnapshot
    {   let mut pairs = vec![
          (IBM_WATSONX_API_KEY, "ibm-key")
        , (IBM_WATSONX_PROJECT_ID, "proj-1")
        ];
        pairs.extend_from_slice(extra);
        EnvSnapshot::from_pairs(pairs)
    }

    fn structured(value: serde_json::Value) -> GenerationResponse
    {   match value
        {   serde_json::Value::Object(map) => GenerationResponse::Structured(map)
          , other => panic!("not an object: {}", other)
        }
    }

    async fn answer_with_reply(
      reply: Result<GenerationResponse, Error>
    ) -> Result<String, Error>
    {   let prompts = RefCell::new(vec![]);
        let answer = generate_answer_with(&credentials(&[]), "q", |_| {
          Ok(FakeModel { prompts: &prompts, reply })
        }).await;
        assert_eq!(*prompts.borrow(), vec!["q".to_string()]);
        answer
    }

    #[tokio::test]
    async fn incomplete_credentials_mean_no_model()
    {   let envs = [
          EnvSnapshot::default()
        , EnvSnapshot::from_pairs([(IBM_WATSONX_PROJECT_ID, "p")])
        , EnvSnapshot::from_pairs([(IBM_WATSONX_API_KEY, "k")])
        , credentials(&[(IBM_WATSONX_URL, "")])
        ];
        for env in envs.iter()
        {   let connects = Cell::new(0);
            let prompts = RefCell::new(vec![]);
            let answer = generate_answer_with(env, "q", |_| {
              connects.set(connects.get() + 1);
              Ok(FakeModel
              {   prompts: &prompts
                , reply: Ok(GenerationResponse::Text(String::new()))
              })
            }).await;
            assert_eq!(answer, Ok(UNAVAILABLE_MESSAGE.to_string()));
            assert_eq!(connects.get(), 0);
        }
    }

    #[tokio::test]
    async fn structured_response_yields_first_result()
    {   let reply = structured(json!({
          "results": [{ "generated_text": "X" }]
        }));
        assert_eq!(answer_with_reply(Ok(reply)).await, Ok("X".to_string()));
    }

    #[tokio::test]
    async fn text_response_passes_through()
    {   let reply = GenerationResponse::Text("Y".to_string());
        assert_eq!(answer_with_reply(Ok(reply)).await, Ok("Y".to_string()));
    }

    #[tokio::test]
    async fn empty_results_yield_empty_answer()
    {   let reply = structured(json!({ "results": [] }));
        assert_eq!(answer_with_reply(Ok(reply)).await, Ok(String::new()));
    }

    #[tokio::test]
    async fn request_failure_propagates()
    {   let failure = Error::ApiError
        {   provider: crate::Provider::Watsonx
          , message: "401 Unauthorized".to_string()
        };
        assert_eq!(answer_with_reply(Err(failure.clone())).await, Err(failure));
    }

    #[tokio::test]
    async fn spec_carries_resolved_settings()
    {   let prompts = RefCell::new(vec![]);
        let seen = RefCell::new(None);
        let env = credentials(&[
          (IBM_WATSONX_SPACE_ID, "space-9")
        , (IBM_WATSONX_URL, "https://eu-de.ml.cloud.ibm.com")
        , (WATSONX_MAX_NEW_TOKENS, "128")
        , (WATSONX_TEMPERATURE, "0.9")
        ]);

        let answer = generate_answer_with(&env, "Define entropy", |spec| {
          *seen.borrow_mut() = Some(spec);
          Ok(FakeModel
          {   prompts: &prompts
            , reply: Ok(GenerationResponse::Text("ok".into()))
          })
        }).await;
        assert_eq!(answer, Ok("ok".to_string()));
        assert_eq!(*prompts.borrow(), vec!["Define entropy".to_string()]);

        let spec = seen.borrow_mut().take().unwrap();
        assert_eq!(spec.model_id, DEFAULT_WATSONX_MODEL);
        assert_eq!(spec.credentials.api_key, "ibm-key");
        assert_eq!(spec.credentials.url, "https://eu-de.ml.cloud.ibm.com");
        assert_eq!(
          serde_json::to_value(&spec.scope).unwrap(),
          json!({ "project_id": "proj-1" })
        );
        assert_eq!(
          spec.params,
          WatsonxParams
          {   decoding_method: DecodingMethod::Greedy
            , max_new_tokens: 128
            , temperature: 0.9
            , top_p: 0.9
            , repetition_penalty: 1.1
          }
        );
    }

    #[test]
    fn credentials_debug_hides_api_key()
    {   let creds = Credentials
        {   api_key: "secret".to_string()
          , url: DEFAULT_WATSONX_URL.to_string()
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("secret"));
        assert!(printed.contains(DEFAULT_WATSONX_URL));
    }

    #[test]
    fn request_body_flattens_scope()
    {   let params = WatsonxParams
        {   decoding_method: DecodingMethod::Greedy
          , max_new_tokens: 1
          , temperature: 0.0
          , top_p: 1.0
          , repetition_penalty: 1.0
        };
        let body = serde_json::to_value(GenerationRequest
        {   model_id: "m"
          , input: "i"
          , parameters: &params
          , scope: &Scope::Space("s".to_string())
        }).unwrap();
        assert_eq!(body["space_id"], "s");
        assert!(body.get("project_id").is_none());
        assert_eq!(body["parameters"]["decoding_method"], "greedy");
    }
}
