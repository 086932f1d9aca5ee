//! Configuration parsing for the REPL chat binary.
//!
//! Command-line argument parsing using clap. The API key is taken from the
//! environment so it never shows up in shell history.
use clap::Parser;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The chat completions endpoint to stream from.
    #[arg(
        short = 'e',
        long,
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub endpoint: Url,

    /// Bearer token for the gateway.
    #[arg(long, env = "DOWNSTREAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier to request. Omit if the gateway pins one.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// System prompt prepended to every request.
    #[arg(short = 's', long)]
    pub system_prompt: Option<String>,

    /// Owner identity under which conversations are stored.
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Fail the stream if no chunk arrives for this many seconds.
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Send only the last N messages of history upstream.
    #[arg(long)]
    pub history_window: Option<usize>,
}
