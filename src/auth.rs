/// Bearer token for the CI job-status endpoint; never printed.
pub struct Token(String);

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_from_str_creates_token() {
        let token = Token::from("ci-status-token-123");
        assert_eq!(token.as_str(), "ci-status-token-123");
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = Token::from("very_secret_pipeline_token");
        let debug_output = format!("{token:?}");

        assert_eq!(debug_output, "<redacted>");
        assert!(!debug_output.contains("secret"));
    }

    #[test]
    fn test_token_debug_in_struct() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct StatusClient {
            token: Token,
            endpoint: String,
        }

        let client = StatusClient {
            token: Token::from("super_secret_token"),
            endpoint: String::from("https://ci.example.com/api/"),
        };

        let debug_output = format!("{client:?}");
        assert!(debug_output.contains("<redacted>"));
        assert!(!debug_output.contains("super_secret_token"));
        assert!(debug_output.contains("https://ci.example.com/api/"));
    }
}
