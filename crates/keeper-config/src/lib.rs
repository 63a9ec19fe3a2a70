//! Keeper configuration.
//!
//! Configuration is read from a TOML, JSON or YAML file (by extension).
//! `${VAR}` and `${VAR:-default}` references in the file are replaced from the
//! environment before parsing, a handful of `KEEPER_*` variables override
//! parsed values, and the result is validated before anything uses it.

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Self::Toml),
			Some("json") => Ok(Self::Json),
			Some("yaml") | Some("yml") => Ok(Self::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				path.display()
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "KEEPER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		info!("Loading configuration from {}", file_path);
		let format = ConfigFormat::from_path(path)?;
		let content = tokio::fs::read_to_string(path).await?;

		self.load_from_str(&content, format)
	}

	/// Substitutes, parses, overrides and validates `content`.
	pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;

		let mut config: Config = match format {
			ConfigFormat::Toml => {
				toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?
			}
			ConfigFormat::Json => serde_json::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string()))?,
			ConfigFormat::Yaml => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string()))?,
		};

		self.apply_env_overrides(&mut config)?;
		self.validate_config(&config)?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut missing = None;
		let result = re.replace_all(content, |cap: &regex::Captures| {
			let var_name = &cap[1];
			match (env::var(var_name), cap.get(2)) {
				(Ok(value), _) => value,
				(Err(_), Some(default)) => default.as_str().to_string(),
				(Err(_), None) => {
					missing.get_or_insert_with(|| var_name.to_string());
					String::new()
				}
			}
		});

		match missing {
			Some(var_name) => Err(ConfigError::EnvVarNotFound(var_name)),
			None => Ok(result.into_owned()),
		}
	}

	fn env_override(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Some(log_level) = self.env_override("LOG_LEVEL") {
			config.keeper.log_level = log_level;
		}

		if let Some(rpc_url) = self.env_override("RPC_URL") {
			debug!("Overriding RPC URL from environment");
			config.network.rpc_url = rpc_url;
		}

		if let Some(key) = self.env_override("PRIVATE_KEY") {
			debug!("Overriding private key from environment");
			config.account.private_key = key;
		}

		if let Some(watermark) = self.env_override("WATERMARK") {
			config.discovery.watermark = watermark
				.trim()
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid watermark: {}", e)))?;
		}

		Ok(())
	}

	fn validate_config(&self, config: &Config) -> Result<(), ConfigError> {
		let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

		let rpc_url = config.network.rpc_url.trim();
		if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
			return invalid("network.rpc_url must be an http(s) URL");
		}
		if config.network.poll_interval_ms == 0 {
			return invalid("network.poll_interval_ms must be greater than zero");
		}
		if config.network.fill_timeout_ms == 0 {
			return invalid("network.fill_timeout_ms must be greater than zero");
		}

		if config.contracts.factory.is_zero() {
			return invalid("contracts.factory must be set");
		}
		if config.contracts.order_book.is_zero() {
			return invalid("contracts.order_book must be set");
		}

		if config.discovery.max_block_jump == 0 {
			return invalid("discovery.max_block_jump must be greater than zero");
		}
		if config.discovery.cycle_timeout_secs == 0 {
			return invalid("discovery.cycle_timeout_secs must be greater than zero");
		}

		if config.retry.max_attempts == 0 {
			return invalid("retry.max_attempts must be at least 1");
		}
		if !(config.retry.multiplier >= 1.0) {
			return invalid("retry.multiplier must be at least 1.0");
		}

		let key = config.account.private_key.trim();
		let key = key.strip_prefix("0x").unwrap_or(key);
		if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
			return invalid("account.private_key must be 64 hex characters (32 bytes)");
		}

		match config.storage.backend.as_str() {
			"memory" | "file" => {}
			other => {
				return Err(ConfigError::ValidationError(format!(
					"Unknown storage backend: {}",
					other
				)))
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use keeper_types::Address;
	use std::str::FromStr;
	use std::time::Duration;

	const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn minimal_toml(private_key: &str) -> String {
		format!(
			r#"
[network]
rpc_url = "http://localhost:8545"

[contracts]
factory = "0xc0a47dFe034B400B8bDb952Fe9dd0c3BC3c3e6d5"
order_book = "0xbd2a43799b83d9d0ff56b85d4c140bce3d1d1c6c"

[account]
private_key = "{}"
"#,
			private_key
		)
	}

	fn loader(prefix: &str) -> ConfigLoader {
		ConfigLoader::new().with_env_prefix(prefix)
	}

	#[test]
	fn test_defaults() {
		let config = loader("KEEPER_TEST_DEFAULTS_")
			.load_from_str(&minimal_toml(DEV_KEY), ConfigFormat::Toml)
			.unwrap();

		assert_eq!(config.keeper.log_level, "info");
		assert_eq!(config.discovery.watermark, DEFAULT_WATERMARK);
		assert_eq!(config.discovery.max_block_jump, 10_000_000);
		assert_eq!(
			config.contracts.excluded_tokens,
			vec![Address::from_str(USDT_ADDRESS).unwrap()]
		);
		assert_eq!(config.storage.backend, "memory");

		let policy = config.retry_policy();
		assert_eq!(policy.max_attempts, 5);
		assert_eq!(policy.delay, Duration::from_millis(500));
		assert_eq!(policy.call_timeout, Some(Duration::from_secs(30)));
	}

	#[test]
	fn test_env_substitution() {
		std::env::set_var("KEEPER_TEST_SUBST_KEY", DEV_KEY);
		let content = minimal_toml("${KEEPER_TEST_SUBST_KEY}")
			+ "\n[storage]\nbackend = \"${KEEPER_TEST_SUBST_UNSET:-file}\"\n";

		let config = loader("KEEPER_TEST_SUBST_")
			.load_from_str(&content, ConfigFormat::Toml)
			.unwrap();

		assert_eq!(config.account.private_key, DEV_KEY);
		assert_eq!(config.storage.backend, "file");
	}

	#[test]
	fn test_missing_env_var() {
		let content = minimal_toml("${KEEPER_TEST_MISSING_VAR_NEVER_SET}");
		let err = loader("KEEPER_TEST_MISSING_")
			.load_from_str(&content, ConfigFormat::Toml)
			.unwrap_err();

		assert!(
			matches!(err, ConfigError::EnvVarNotFound(ref name) if name == "KEEPER_TEST_MISSING_VAR_NEVER_SET")
		);
	}

	#[test]
	fn test_env_overrides() {
		std::env::set_var("KEEPER_TEST_OVR_WATERMARK", "9000000");
		std::env::set_var("KEEPER_TEST_OVR_RPC_URL", "https://rpc.example.org");
		std::env::set_var("KEEPER_TEST_OVR_LOG_LEVEL", "debug");

		let config = loader("KEEPER_TEST_OVR_")
			.load_from_str(&minimal_toml(DEV_KEY), ConfigFormat::Toml)
			.unwrap();

		assert_eq!(config.discovery.watermark, 9_000_000);
		assert_eq!(config.network.rpc_url, "https://rpc.example.org");
		assert_eq!(config.keeper.log_level, "debug");
	}

	#[test]
	fn test_invalid_watermark_override() {
		std::env::set_var("KEEPER_TEST_BADWM_WATERMARK", "latest");
		let err = loader("KEEPER_TEST_BADWM_")
			.load_from_str(&minimal_toml(DEV_KEY), ConfigFormat::Toml)
			.unwrap_err();

		assert!(matches!(err, ConfigError::ValidationError(_)));
	}

	#[test]
	fn test_validation_failures() {
		let loader = loader("KEEPER_TEST_VALIDATE_");

		let bad_key = loader.load_from_str(&minimal_toml("0x1234"), ConfigFormat::Toml);
		assert!(matches!(bad_key, Err(ConfigError::ValidationError(_))));

		let bad_url = minimal_toml(DEV_KEY).replace("http://localhost:8545", "localhost");
		assert!(matches!(
			loader.load_from_str(&bad_url, ConfigFormat::Toml),
			Err(ConfigError::ValidationError(_))
		));

		let no_jump = minimal_toml(DEV_KEY) + "\n[discovery]\nmax_block_jump = 0\n";
		assert!(matches!(
			loader.load_from_str(&no_jump, ConfigFormat::Toml),
			Err(ConfigError::ValidationError(_))
		));

		let bad_backend = minimal_toml(DEV_KEY) + "\n[storage]\nbackend = \"redis\"\n";
		assert!(matches!(
			loader.load_from_str(&bad_backend, ConfigFormat::Toml),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_json_and_yaml() {
		let json = format!(
			r#"{{
				"network": {{ "rpc_url": "http://localhost:8545", "block_delay": 3 }},
				"contracts": {{
					"factory": "0xc0a47dFe034B400B8bDb952Fe9dd0c3BC3c3e6d5",
					"order_book": "0xbd2a43799b83d9d0ff56b85d4c140bce3d1d1c6c",
					"excluded_tokens": []
				}},
				"account": {{ "private_key": "{}" }}
			}}"#,
			DEV_KEY
		);
		let config = loader("KEEPER_TEST_JSON_")
			.load_from_str(&json, ConfigFormat::Json)
			.unwrap();
		assert_eq!(config.network.block_delay, 3);
		assert!(config.contracts.excluded_tokens.is_empty());

		let yaml = format!(
			"network:\n  rpc_url: http://localhost:8545\ncontracts:\n  factory: \"0xc0a47dFe034B400B8bDb952Fe9dd0c3BC3c3e6d5\"\n  order_book: \"0xbd2a43799b83d9d0ff56b85d4c140bce3d1d1c6c\"\naccount:\n  private_key: \"{}\"\nretry:\n  max_attempts: 2\n",
			DEV_KEY
		);
		let config = loader("KEEPER_TEST_YAML_")
			.load_from_str(&yaml, ConfigFormat::Yaml)
			.unwrap();
		assert_eq!(config.retry.max_attempts, 2);
	}

	#[test]
	fn test_format_from_extension() {
		assert_eq!(
			ConfigFormat::from_path(Path::new("keeper.toml")).unwrap(),
			ConfigFormat::Toml
		);
		assert_eq!(
			ConfigFormat::from_path(Path::new("keeper.yml")).unwrap(),
			ConfigFormat::Yaml
		);
		assert!(ConfigFormat::from_path(Path::new("keeper.ini")).is_err());
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("keeper.toml");
		std::fs::write(&path, minimal_toml(DEV_KEY)).unwrap();

		let config = loader("KEEPER_TEST_FILE_")
			.with_file(&path)
			.load()
			.await
			.unwrap();
		assert_eq!(config.network.rpc_url, "http://localhost:8545");

		let missing = loader("KEEPER_TEST_FILE_")
			.with_file(dir.path().join("absent.toml"))
			.load()
			.await;
		assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
	}

	#[test]
	fn test_private_key_is_redacted() {
		let config = loader("KEEPER_TEST_REDACT_")
			.load_from_str(&minimal_toml(DEV_KEY), ConfigFormat::Toml)
			.unwrap();
		let shown = format!("{:?}", config.account);
		assert!(!shown.contains(&DEV_KEY[2..]));
	}
}
