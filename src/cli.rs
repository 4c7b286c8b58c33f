use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "climakey", about = "Keyboard shortcuts for a networked air conditioner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the hotkey daemon
    Run {
        #[command(flatten)]
        device: DeviceArgs,
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        speech: SpeechArgs,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Execute a single command and exit
    Send {
        #[command(subcommand)]
        action: SendAction,
        #[command(flatten)]
        device: DeviceArgs,
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        speech: SpeechArgs,
    },

    /// Print raw key events and decoded commands
    Keys {
        #[command(flatten)]
        keys: KeyArgs,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAction {
    /// Toggle power
    Toggle,
    /// Announce unit and room status
    Status,
    /// Power on
    On,
    /// Power off
    Off,
    /// Set the target temperature
    Set { temperature: u8 },
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Base URL of the device API
    #[arg(long, env = "CLIMAKEY_API_URL")]
    pub api_url: String,

    /// Bearer token for the device API
    #[arg(long, env = "CLIMAKEY_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "CLIMAKEY_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Lowest accepted target temperature
    #[arg(long, env = "CLIMAKEY_MIN_TEMP", default_value_t = 16)]
    pub min_temp: u8,

    /// Highest accepted target temperature
    #[arg(long, env = "CLIMAKEY_MAX_TEMP", default_value_t = 30)]
    pub max_temp: u8,

    /// Total attempts per action, including the first
    #[arg(long, env = "CLIMAKEY_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Backoff after the first failure, in milliseconds
    #[arg(long, env = "CLIMAKEY_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Upper bound on any backoff, in milliseconds
    #[arg(long, env = "CLIMAKEY_RETRY_MAX_MS", default_value_t = 8000)]
    pub retry_max_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds
    #[arg(long, env = "CLIMAKEY_RETRY_JITTER_MS", default_value_t = 1000)]
    pub retry_jitter_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SpeechArgs {
    /// Text-to-speech program
    #[arg(long, env = "CLIMAKEY_TTS_PROGRAM", default_value = "espeak")]
    pub tts_program: String,

    /// Arguments passed before the text
    #[arg(
        long,
        env = "CLIMAKEY_TTS_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    pub tts_args: Vec<String>,

    /// Upper bound on one announcement, in seconds
    #[arg(long, env = "CLIMAKEY_TTS_TIMEOUT_SECS", default_value_t = 15)]
    pub tts_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Toggle power
    #[arg(long, env = "CLIMAKEY_TOGGLE_KEY", default_value = "Ctrl+KP_Enter")]
    pub toggle_key: String,

    /// Announce status
    #[arg(
        long,
        env = "CLIMAKEY_STATUS_KEY",
        default_value = "Ctrl+KP_Multiply"
    )]
    pub status_key: String,

    /// Power on
    #[arg(long, env = "CLIMAKEY_POWER_ON_KEY", default_value = "Ctrl+Alt+KP_Add")]
    pub power_on_key: String,

    /// Power off
    #[arg(
        long,
        env = "CLIMAKEY_POWER_OFF_KEY",
        default_value = "Ctrl+Alt+KP_Subtract"
    )]
    pub power_off_key: String,
}
