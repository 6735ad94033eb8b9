use std::fmt;

/// Error type for studymate-llm operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// An environment variable held a value that could not be parsed
    InvalidConfiguration(String)
  , /// HTTP transport error
    HttpError(String)
  , /// Backend returned an error response
    ApiError
    {   provider: crate::Provider
      , message: String
    }
  , /// Failed to parse backend response
    ParseError(String)
  , /// Backend answered with no generation results
    EmptyResponse(crate::Provider)
  , /// Timeout error
    Timeout
  , /// Generic error
    Other(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ApiError { provider, message } => {
              write!(f, "{} API error: {}", provider, message)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::EmptyResponse(provider) => {
              write!(f,
                "{} response contained no generated text",
                provider
              )
            }
          , Error::Timeout => {
              write!(f, "Request timed out")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Timeout
        } else if e.is_decode()
        {   Error::ParseError(e.to_string())
        } else
        {   Error::HttpError(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn api_error_names_the_provider()
    {   let err = Error::ApiError
        {   provider: crate::Provider::HuggingFace
          , message: "Model is loading".to_string()
        };
        assert_eq!(
          err.to_string(),
          "Hugging Face API error: Model is loading"
        );
    }

    #[test]
    fn strings_become_other()
    {   assert_eq!(Error::from("boom"), Error::Other("boom".to_string()));
        assert_eq!(Error::from("boom").to_string(), "Error: boom");
    }
}
