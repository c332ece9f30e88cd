//! Service configuration.
//!
//! Every option can be given as a flag or an environment variable. Values
//! are validated once at startup and never reloaded.

use clap::Args;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::report::openai::DEFAULT_MODEL;
use crate::report::{LlmProvider, OpenAiReportGenerator};
use crate::session::{ClosePolicy, MonitorConfig};

/// Options for `alert-correlator serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the webhook server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Seconds without a new alert before a session closes
    #[arg(long, env = "INACTIVITY_GAP", default_value_t = 60)]
    pub inactivity_gap: u64,

    /// Maximum session lifetime in seconds
    #[arg(long, env = "MAX_SESSION_DURATION", default_value_t = 1800)]
    pub max_session_duration: u64,

    /// Seconds between session checks
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 10)]
    pub poll_interval: u64,

    /// Upper bound in seconds on one report generation call
    #[arg(long, env = "REPORT_TIMEOUT", default_value_t = 60)]
    pub report_timeout: u64,

    /// Close and report the open session on shutdown
    #[arg(long, env = "FLUSH_ON_SHUTDOWN")]
    pub flush_on_shutdown: bool,

    /// LLM backend (openai or ollama)
    #[arg(long, env = "LLM_PROVIDER", default_value = "openai")]
    pub llm_provider: LlmProvider,

    /// Model used for incident reports
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub llm_model: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Override the OpenAI API root (proxies, Azure)
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Ollama server URL (e.g. http://ollama:11434)
    #[arg(long, env = "OLLAMA_BASE_URL")]
    pub ollama_base_url: Option<String>,
}

/// LLM client settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Backend
    pub provider: LlmProvider,
    /// Model name
    pub model: String,
    /// API key (OpenAI only)
    pub api_key: Option<String>,
    /// API root the chat-completions path is appended to
    pub base_url: String,
}

impl LlmConfig {
    /// Build the report generator for this configuration.
    #[must_use]
    pub fn build_generator(&self) -> OpenAiReportGenerator {
        OpenAiReportGenerator::new(self.provider)
            .with_api_key(self.api_key.clone())
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone())
    }
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Webhook server address
    pub bind_addr: SocketAddr,
    /// Session monitor settings
    pub monitor: MonitorConfig,
    /// Report generator settings
    pub llm: LlmConfig,
}

impl ServeArgs {
    /// Validate the arguments.
    pub fn into_config(self) -> Result<CorrelatorConfig, ConfigError> {
        let bind_addr = self
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBindAddr {
                addr: self.bind.clone(),
                reason: e.to_string(),
            })?;

        let monitor = MonitorConfig {
            policy: ClosePolicy {
                inactivity_gap: positive_secs("inactivity gap", self.inactivity_gap)?,
                max_session_duration: positive_secs(
                    "max session duration",
                    self.max_session_duration,
                )?,
            },
            poll_interval: positive_secs("poll interval", self.poll_interval)?,
            report_timeout: positive_secs("report timeout", self.report_timeout)?,
            flush_on_shutdown: self.flush_on_shutdown,
        };

        let base_url = match self.llm_provider {
            LlmProvider::OpenAi => self.openai_base_url,
            LlmProvider::Ollama => self.ollama_base_url.as_deref().map(ollama_api_root),
        }
        .unwrap_or_else(|| self.llm_provider.default_base_url().to_string());

        Ok(CorrelatorConfig {
            bind_addr,
            monitor,
            llm: LlmConfig {
                provider: self.llm_provider,
                model: self.llm_model,
                api_key: self.openai_api_key,
                base_url,
            },
        })
    }
}

fn positive_secs(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroDuration { name });
    }
    Ok(Duration::from_secs(secs))
}

/// Ollama's OpenAI-compatible API lives under `/v1`.
fn ollama_api_root(server_url: &str) -> String {
    let trimmed = server_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["alert-correlator"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().serve
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--openai-api-key", "sk-test"]).into_config().unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.monitor.policy, ClosePolicy::default());
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(10));
        assert_eq!(config.monitor.report_timeout, Duration::from_secs(60));
        assert!(!config.monitor.flush_on_shutdown);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--inactivity-gap",
            "5",
            "--max-session-duration",
            "120",
            "--poll-interval",
            "1",
            "--flush-on-shutdown",
            "--bind",
            "127.0.0.1:8080",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.monitor.policy.inactivity_gap, Duration::from_secs(5));
        assert_eq!(
            config.monitor.policy.max_session_duration,
            Duration::from_secs(120)
        );
        assert_eq!(config.monitor.poll_interval, Duration::from_secs(1));
        assert!(config.monitor.flush_on_shutdown);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_ollama_base_url() {
        let config = parse(&[
            "--llm-provider",
            "ollama",
            "--ollama-base-url",
            "http://ollama:11434/",
            "--llm-model",
            "llama3",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.base_url, "http://ollama:11434/v1");
        assert!(config.llm.build_generator().is_configured());
    }

    #[test]
    fn test_rejects_zero_durations() {
        let err = parse(&["--poll-interval", "0"]).into_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ZeroDuration {
                name: "poll interval"
            }
        ));
    }

    #[test]
    fn test_rejects_bad_bind_addr() {
        let err = parse(&["--bind", "localhost"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let result = TestCli::try_parse_from(["alert-correlator", "--llm-provider", "bard"]);
        assert!(result.is_err());
    }
}
