use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub mail: MailSettings,
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Vec<String>,
    /// Base of the download links handed back to clients.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub labels_path: String,
    pub max_samples_per_job: usize,
    /// Upper bound on samples x copies for one job.
    pub max_labels_per_job: usize,
    /// Jobs and their PDFs are dropped this long after creation; 0 keeps them forever.
    pub job_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailTransportKind {
    /// Write `.eml` files into `mail.file_dir`.
    File,
    /// Unencrypted SMTP on localhost.
    Local,
    Smtp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailSettings {
    pub transport: MailTransportKind,
    pub from: String,
    pub file_dir: String,
    pub smtp_url: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    /// Left unset the HTTP client never times out.
    pub timeout_secs: Option<u64>,
    pub download_dir: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let defaults = Self::default();

        let s = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default("server.request_timeout_secs", defaults.server.request_timeout_secs as i64)?
            .set_default("server.cors_allowed_origins", defaults.server.cors_allowed_origins)?
            .set_default("server.public_url", defaults.server.public_url)?
            .set_default("storage.labels_path", defaults.storage.labels_path)?
            .set_default("storage.max_samples_per_job", defaults.storage.max_samples_per_job as i64)?
            .set_default("storage.max_labels_per_job", defaults.storage.max_labels_per_job as i64)?
            .set_default("storage.job_ttl_secs", defaults.storage.job_ttl_secs as i64)?
            .set_default("mail.transport", "file")?
            .set_default("mail.from", defaults.mail.from)?
            .set_default("mail.file_dir", defaults.mail.file_dir)?
            .set_default("mail.timeout_secs", defaults.mail.timeout_secs.unwrap_or(30) as i64)?
            .set_default("client.base_url", defaults.client.base_url)?
            .set_default("client.download_dir", defaults.client.download_dir)?
            // Add default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local overrides
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (with prefix LABGUARD_)
            .add_source(
                Environment::with_prefix("LABGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Layered settings with the plain deployment variables (`SERVER_PORT`, `SMTP_URL`, ...) on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new()?.with_env_overrides())
    }
}

impl Settings {
    /// Apply environment variable overrides to default settings
    fn with_env_overrides(mut self) -> Self {
        // Server
        if let Ok(host) = env::var("SERVER_HOST") { self.server.host = host; }
        if let Ok(port) = env::var("SERVER_PORT") { self.server.port = port.parse().unwrap_or(8090); }
        if let Ok(url) = env::var("PUBLIC_URL") { self.server.public_url = url; }

        // Storage
        if let Ok(path) = env::var("LABELS_PATH") { self.storage.labels_path = path; }
        if let Ok(ttl) = env::var("JOB_TTL_SECS") { self.storage.job_ttl_secs = ttl.parse().unwrap_or(self.storage.job_ttl_secs); }

        // Mail
        if let Ok(kind) = env::var("MAIL_TRANSPORT") {
            self.mail.transport = match kind.to_lowercase().as_str() {
                "smtp" => MailTransportKind::Smtp,
                "local" => MailTransportKind::Local,
                _ => MailTransportKind::File,
            };
        }
        if let Ok(from) = env::var("MAIL_FROM") { self.mail.from = from; }
        if let Ok(dir) = env::var("MAIL_FILE_DIR") { self.mail.file_dir = dir; }
        if let Ok(url) = env::var("SMTP_URL") { self.mail.smtp_url = Some(url); }
        if let Ok(user) = env::var("SMTP_USERNAME") { self.mail.smtp_username = Some(user); }
        if let Ok(pass) = env::var("SMTP_PASSWORD") { self.mail.smtp_password = Some(pass); }

        // Client
        if let Ok(url) = env::var("PRINT_SERVICE_URL") { self.client.base_url = url; }
        if let Ok(dir) = env::var("DOWNLOAD_DIR") { self.client.download_dir = dir; }

        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8090,
                workers: None,
                request_timeout_secs: 60,
                cors_allowed_origins: vec!["*".to_string()],
                public_url: "http://localhost:8090".to_string(),
            },
            storage: StorageSettings {
                labels_path: "./labels".to_string(),
                max_samples_per_job: 500,
                max_labels_per_job: 5_000,
                job_ttl_secs: 86_400,
            },
            mail: MailSettings {
                transport: MailTransportKind::File,
                from: "LabGuard Pro <labels@labguard.local>".to_string(),
                file_dir: "./outbox".to_string(),
                smtp_url: None,
                smtp_username: None,
                smtp_password: None,
                timeout_secs: Some(30),
            },
            client: ClientSettings {
                base_url: "http://localhost:8090".to_string(),
                timeout_secs: None,
                download_dir: "./downloads".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_client_at_local_server() {
        let settings = Settings::default();
        assert_eq!(settings.client.base_url, settings.server.public_url);
        assert_eq!(settings.mail.transport, MailTransportKind::File);
        assert!(settings.client.timeout_secs.is_none());
    }

    #[test]
    fn layered_config_falls_back_to_defaults() {
        // no config/ directory exists in the test working dir
        let settings = Settings::new().unwrap();
        assert!(!settings.server.host.is_empty());
        assert!(settings.storage.max_samples_per_job > 0);
        assert!(settings.storage.max_labels_per_job >= settings.storage.max_samples_per_job);
    }

    #[test]
    fn layered_config_keeps_smtp_timeout() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.mail.timeout_secs, Settings::default().mail.timeout_secs);
        assert_eq!(settings.mail.timeout_secs, Some(30));
        assert_eq!(settings.storage.job_ttl_secs, 86_400);
    }
}
