// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Directory containing scenario catalog JSON files.
    pub data_dir: PathBuf,
    /// Correct answers needed to win a quiz play-through.
    pub win_at: u32,
    /// Wrong answers that end a quiz play-through.
    pub lose_at: u32,
    /// Remove sessions idle longer than this. Unset disables the sweeper.
    pub session_idle_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `DATA_DIR` - Path to the catalog directory (default: `data`)
    /// - `WIN_AT` - Correct answers to win (default: 10)
    /// - `LOSE_AT` - Wrong answers to lose (default: 5)
    /// - `SESSION_IDLE_TIMEOUT_SECS` - Idle sweep threshold; unset disables it
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--data-dir <DIR>` - Override the catalog directory
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(8080);

        let data_dir = Self::parse_cli_value(&args, "--data-dir")
            .map(PathBuf::from)
            .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let win_at = std::env::var("WIN_AT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let lose_at = std::env::var("LOSE_AT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let session_idle_timeout_secs = std::env::var("SESSION_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok());

        Config {
            port,
            data_dir,
            win_at,
            lose_at,
            session_idle_timeout_secs,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
