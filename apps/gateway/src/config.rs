use core_config::{env_parsed_or, env_required};

pub use core_config::Environment;

const DEFAULT_PORT: u16 = 8080;

/// Gateway configuration. The upstream credentials are required: a gateway
/// without them would forward unauthenticated requests and every call would
/// fail downstream, so missing values abort startup with a hint instead.
#[derive(Clone, Debug)]
pub struct Config {
    pub store_url: String,
    pub store_api_key: String,
    pub port: u16,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let store_url = env_required("STORE_URL").map_err(|e| {
            eyre::eyre!("{e}. Set STORE_URL to the upstream store base URL, e.g. https://cluster.example.com:6333")
        })?;
        let store_api_key = env_required("STORE_API_KEY").map_err(|e| {
            eyre::eyre!("{e}. Set STORE_API_KEY to the server-held upstream API key")
        })?;

        Ok(Self {
            // Trailing slash would double up when joining forwarded paths
            store_url: store_url.trim_end_matches('/').to_string(),
            store_api_key,
            port: env_parsed_or("GATEWAY_PORT", DEFAULT_PORT),
            environment: Environment::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_url_fails_with_hint() {
        temp_env::with_vars(
            [
                ("STORE_URL", None),
                ("STORE_API_KEY", Some("key")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("STORE_URL"));
                assert!(err.to_string().contains("upstream store base URL"));
            },
        );
    }

    #[test]
    fn test_missing_api_key_fails_with_hint() {
        temp_env::with_vars(
            [
                ("STORE_URL", Some("https://store.example.com")),
                ("STORE_API_KEY", None),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("STORE_API_KEY"));
            },
        );
    }

    #[test]
    fn test_defaults_and_url_normalization() {
        temp_env::with_vars(
            [
                ("STORE_URL", Some("https://store.example.com/")),
                ("STORE_API_KEY", Some("key")),
                ("GATEWAY_PORT", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.store_url, "https://store.example.com");
                assert_eq!(config.port, DEFAULT_PORT);
            },
        );
    }

    #[test]
    fn test_port_override() {
        temp_env::with_vars(
            [
                ("STORE_URL", Some("https://store.example.com")),
                ("STORE_API_KEY", Some("key")),
                ("GATEWAY_PORT", Some("9999")),
            ],
            || {
                assert_eq!(Config::from_env().unwrap().port, 9999);
            },
        );
    }
}
