use clap::{ArgAction, Parser, ValueEnum};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Parser, Debug)]
#[command(name = "bloombuddy", version, about = "HTTP API server for BloomBuddy")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
}

/// Which chat-completion backend enriches identifications.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Any OpenAI-compatible `/chat/completions` endpoint (`OpenAI`, `OpenRouter`, ...)
    Openai,
    /// Google Gemini `generateContent`
    Gemini,
}

/// `BloomBuddy` server configuration
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease verbosity (-q, -qq, -qqq)
    #[arg(short = 'q', action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Address to bind the HTTP server to
    #[arg(long, env = "BLOOM_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Log file path (logs are written to stdout + this file)
    #[arg(long, env = "BLOOM_LOG_FILE", default_value = "bloombuddy.logs")]
    pub log_file: PathBuf,

    /// Directory where uploaded images are staged while a request is in flight.
    /// Defaults to `<system temp>/bloombuddy-uploads`.
    #[arg(long, env = "BLOOM_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// `PlantNet` API key
    #[arg(long, env = "BLOOM_PLANTNET_API_KEY")]
    pub plantnet_api_key: Option<String>,

    /// `PlantNet` API base URL
    #[arg(long, env = "BLOOM_PLANTNET_API_URL", default_value = "https://my-api.plantnet.org")]
    pub plantnet_api_url: String,

    /// `PlantNet` flora project to identify against
    #[arg(long, env = "BLOOM_PLANTNET_PROJECT", default_value = "all")]
    pub plantnet_project: String,

    /// Timeout for a single `PlantNet` call, in seconds
    #[arg(long, env = "BLOOM_PLANTNET_TIMEOUT_SECS", default_value_t = 30)]
    pub plantnet_timeout_secs: u64,

    /// LLM provider used for enrichment and recommendations
    #[arg(long, env = "BLOOM_LLM_PROVIDER", value_enum, default_value_t = LlmProvider::Openai)]
    pub llm_provider: LlmProvider,

    /// API key for the OpenAI-compatible provider
    #[arg(long, env = "BLOOM_LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// OpenAI-compatible API URL
    #[arg(long, env = "BLOOM_LLM_API_URL", default_value = "https://openrouter.ai/api/v1")]
    pub llm_api_url: String,

    /// Model name for the OpenAI-compatible provider
    #[arg(long, env = "BLOOM_LLM_MODEL", default_value = "openai/gpt-4o-mini")]
    pub llm_model: String,

    /// Gemini API key
    #[arg(long, env = "BLOOM_GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    /// Gemini API URL
    #[arg(
        long,
        env = "BLOOM_GEMINI_API_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_api_url: String,

    /// Gemini model name
    #[arg(long, env = "BLOOM_GEMINI_MODEL", default_value = "gemini-1.5-flash")]
    pub gemini_model: String,

    /// Timeout for a single LLM call, in seconds
    #[arg(long, env = "BLOOM_LLM_TIMEOUT_SECS", default_value_t = 60)]
    pub llm_timeout_secs: u64,
}

impl Config {
    #[must_use]
    pub fn verbosity_delta(&self) -> i16 {
        i16::from(self.verbose) - i16::from(self.quiet)
    }

    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity_delta() {
            d if d <= -2 => "error",
            -1 => "warn",
            0 => "info,bloombuddy=info,axum=info,tower_http=info",
            1 => "debug,bloombuddy=debug,axum=info,tower_http=info,reqwest=info",
            2 => "trace,bloombuddy=trace,axum=debug,tower_http=trace,reqwest=debug,hyper=info",
            _ => "trace,bloombuddy=trace,axum=trace,tower_http=trace,reqwest=trace,hyper=debug",
        }
    }

    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("bloombuddy-uploads"))
    }

    #[must_use]
    pub const fn plantnet_timeout(&self) -> Duration {
        Duration::from_secs(self.plantnet_timeout_secs)
    }

    #[must_use]
    pub const fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["bloombuddy"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn verbosity_flags_shift_the_filter() {
        assert_eq!(parse(&["-qq"]).log_filter(), "error");
        assert_eq!(parse(&["-q"]).log_filter(), "warn");
        assert!(parse(&["-vv"]).log_filter().starts_with("trace,"));
        assert_eq!(parse(&["-v", "-q"]).verbosity_delta(), 0);
    }

    #[test]
    fn provider_parses_from_cli() {
        let cfg = parse(&["--llm-provider", "gemini", "--llm-timeout-secs", "5"]);
        assert_eq!(cfg.llm_provider, LlmProvider::Gemini);
        assert_eq!(cfg.llm_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn explicit_upload_dir_wins() {
        let cfg = parse(&["--upload-dir", "/srv/uploads"]);
        assert_eq!(cfg.upload_dir(), PathBuf::from("/srv/uploads"));
    }
}
