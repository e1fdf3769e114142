//! Configuração do stagewatch carregada a partir de `stagewatch.toml`.
//!
//! A struct [`StagewatchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `ATLS_DATABASE_URL` e `ADM_DATABASE_URL` têm
//! precedência sobre o arquivo.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StatusError};
use crate::origin::NaiveTimestampZone;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "stagewatch.toml";

/// Configuração de nível superior carregada de `stagewatch.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct StagewatchConfig {
    /// URL Postgres do store de log de transações (ATLS).
    #[serde(default)]
    pub atls_database_url: String,

    /// URL Postgres do store de marcadores (ADM).
    #[serde(default)]
    pub adm_database_url: String,

    /// Conexões máximas por pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Tempo máximo, em segundos, para obter uma conexão do pool.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Teto, em segundos, para cada consulta de origem.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Minutos desde o primeiro evento até um estágio incompleto virar `long_running`.
    #[serde(default = "default_long_running_threshold_minutes")]
    pub long_running_threshold_minutes: i64,

    /// Usa os ids vistos nos marcadores quando o ATLS não tem nenhum para a chave.
    #[serde(default = "default_adm_fallback")]
    pub adm_fallback_when_atls_empty: bool,

    /// Validade, em segundos, das linhas guardadas no cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Fuso das colunas `timestamp` sem fuso: `local` (padrão), `utc` ou `±HH:MM`.
    #[serde(default)]
    pub naive_timestamp_zone: NaiveTimestampZone,
}

// Valor padrão para conexões por pool: 5.
fn default_max_connections() -> u32 {
    5
}

// Valor padrão para aquisição de conexão: 30s.
fn default_acquire_timeout_secs() -> u64 {
    30
}

// Valor padrão para o teto de consulta: 180s.
fn default_query_timeout_secs() -> u64 {
    180
}

// Valor padrão para o limiar de long_running: 30 minutos.
fn default_long_running_threshold_minutes() -> i64 {
    30
}

fn default_adm_fallback() -> bool {
    true
}

// Valor padrão para o TTL do cache: 20s.
fn default_cache_ttl_secs() -> u64 {
    20
}

impl Default for StagewatchConfig {
    fn default() -> Self {
        Self {
            atls_database_url: String::new(),
            adm_database_url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            long_running_threshold_minutes: default_long_running_threshold_minutes(),
            adm_fallback_when_atls_empty: default_adm_fallback(),
            cache_ttl_secs: default_cache_ttl_secs(),
            naive_timestamp_zone: NaiveTimestampZone::default(),
        }
    }
}

impl StagewatchConfig {
    /// Carrega a configuração de `path`, ou de `stagewatch.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Como [`load`](Self::load), lendo as variáveis por meio de `env`.
    pub fn load_with_env(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<StagewatchConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo para as URLs.
        if let Some(url) = env("ATLS_DATABASE_URL").filter(|url| !url.is_empty()) {
            config.atls_database_url = url;
        }
        if let Some(url) = env("ADM_DATABASE_URL").filter(|url| !url.is_empty()) {
            config.adm_database_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(StatusError::Config("max_connections must be at least 1".into()));
        }
        if self.query_timeout_secs == 0 {
            return Err(StatusError::Config("query_timeout_secs must be at least 1".into()));
        }
        if self.long_running_threshold_minutes < 0 {
            return Err(StatusError::Config(
                "long_running_threshold_minutes must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Falha quando alguma das URLs de banco não foi definida.
    pub fn require_database_urls(&self) -> Result<()> {
        if self.atls_database_url.is_empty() {
            return Err(StatusError::Config(
                "atls_database_url is not set (file or ATLS_DATABASE_URL)".into(),
            ));
        }
        if self.adm_database_url.is_empty() {
            return Err(StatusError::Config(
                "adm_database_url is not set (file or ADM_DATABASE_URL)".into(),
            ));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn long_running_threshold(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(self.long_running_threshold_minutes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_values() {
        let config = StagewatchConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.query_timeout(), Duration::from_secs(180));
        assert_eq!(config.cache_ttl(), Duration::from_secs(20));
        assert_eq!(config.long_running_threshold(), chrono::TimeDelta::minutes(30));
        assert!(config.adm_fallback_when_atls_empty);
        assert!(config.atls_database_url.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            adm_database_url = "postgres://adm"
            query_timeout_secs = 60
            adm_fallback_when_atls_empty = false
        "#;
        let config: StagewatchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.adm_database_url, "postgres://adm");
        assert_eq!(config.query_timeout_secs, 60);
        assert!(!config.adm_fallback_when_atls_empty);
        assert_eq!(config.cache_ttl_secs, 20);
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "long_running_threshold_minutes = 45").unwrap();
        writeln!(file, "max_connections = 2").unwrap();
        let config = StagewatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.long_running_threshold_minutes, 45);
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(CONFIG_FILE);
        let config = StagewatchConfig::load(Some(&missing)).unwrap();
        assert_eq!(config.query_timeout_secs, 180);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_connections = 0").unwrap();
        let err = StagewatchConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, StatusError::Config(_)));
    }

    #[test]
    fn broken_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_connections = \"many").unwrap();
        let err = StagewatchConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, StatusError::Toml(_)));
    }

    #[test]
    fn env_urls_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "atls_database_url = \"postgres://file/atls\"").unwrap();
        writeln!(file, "adm_database_url = \"postgres://file/adm\"").unwrap();
        let env = |name: &str| match name {
            "ATLS_DATABASE_URL" => Some("postgres://env/atls".to_string()),
            "ADM_DATABASE_URL" => Some(String::new()),
            _ => None,
        };
        let config = StagewatchConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.atls_database_url, "postgres://env/atls");
        assert_eq!(config.adm_database_url, "postgres://file/adm");
    }

    #[test]
    fn process_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "adm_database_url = \"postgres://file/adm\"").unwrap();
        // Nenhum outro teste verifica a URL do ATLS vinda de `load`.
        unsafe { std::env::set_var("ATLS_DATABASE_URL", "postgres://env/atls") };
        let config = StagewatchConfig::load(Some(file.path())).unwrap();
        unsafe { std::env::remove_var("ATLS_DATABASE_URL") };
        assert_eq!(config.atls_database_url, "postgres://env/atls");
        assert_eq!(config.adm_database_url, "postgres://file/adm");
    }

    #[test]
    fn naive_timestamp_zone_is_configurable() {
        assert_eq!(
            StagewatchConfig::default().naive_timestamp_zone,
            NaiveTimestampZone::Local
        );
        let config: StagewatchConfig = toml::from_str(r#"naive_timestamp_zone = "-05:00""#).unwrap();
        assert_eq!(
            config.naive_timestamp_zone,
            NaiveTimestampZone::Fixed(chrono::FixedOffset::west_opt(5 * 3600).unwrap())
        );
        assert!(toml::from_str::<StagewatchConfig>(r#"naive_timestamp_zone = "mars""#).is_err());
    }

    #[test]
    fn missing_urls_are_reported() {
        let config = StagewatchConfig::default();
        let err = config.require_database_urls().unwrap_err();
        assert!(err.to_string().contains("atls_database_url"));
    }
}
