use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HttpConfig {
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DownloadConfig {
    /// Parallel segment workers per variant. 0 or absent means one per CPU.
    pub parallelism: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    /// Base directory for per-episode scratch directories.
    pub scratch_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FfmpegConfig {
    pub executable: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub filters: Option<String>,
}

impl Config {
    /// Loads `torii.toml` from the working directory. A missing file is not
    /// an error, every key has a usable default.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_str = std::fs::read_to_string("torii.toml").unwrap_or_else(|_| "".to_string());
        if config_str.is_empty() {
            return Ok(Self::default());
        }
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http.timeout_secs.unwrap_or(30))
    }

    pub fn parallelism(&self) -> usize {
        match self.download.parallelism {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn scratch_base(&self) -> std::path::PathBuf {
        self.download
            .scratch_dir
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}
