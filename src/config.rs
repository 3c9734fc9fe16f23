use crate::keys;
use crate::window::ProcessContext;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Имена процессов, чьи окна отслеживаются
    #[serde(default = "default_target_processes")]
    pub target_processes: Vec<String>,
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_seconds: u64,
    #[serde(default = "default_keys_to_send")]
    pub keys_to_send: String,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    /// Бэкенд терминала: auto | wezterm | tmux
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub process_overrides: HashMap<String, ProcessOverride>,
    #[serde(default)]
    pub exclusions: ExclusionConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    // Оптимизационные индексы - не сериализуются, строятся после загрузки
    #[serde(skip)]
    exclusion_titles_lower: Vec<String>,
    #[serde(skip)]
    exclusion_command_lines_lower: Vec<String>,
    #[serde(skip)]
    effective_cache: HashMap<String, EffectiveConfig>,
    #[serde(skip)]
    default_effective: EffectiveConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            filter: "tcm_rust=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdvancedConfig {
    pub max_windows: usize,
    pub window_operation_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay: u64,
    pub use_hash_optimization: bool,
    pub hash_sample_size: usize,
    pub metrics_interval: u64,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_windows: 50,
            window_operation_timeout: 5,
            retry_attempts: 3,
            retry_delay: 1,
            use_hash_optimization: true,
            hash_sample_size: 1000,
            metrics_interval: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExclusionConfig {
    #[serde(default)]
    pub window_titles: Vec<String>,
    #[serde(default)]
    pub command_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessOverride {
    pub inactivity_threshold_seconds: Option<u64>,
    pub keys_to_send: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub desktop_notifications: bool,
}

/// Итоговые настройки для конкретного имени процесса: глобальные значения,
/// слитые с process_overrides. Вычисляются один раз при загрузке конфигурации.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub inactivity_threshold: Duration,
    pub keys_to_send: String,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(default_inactivity_threshold()),
            keys_to_send: default_keys_to_send(),
        }
    }
}

fn default_target_processes() -> Vec<String> {
    vec!["bash".to_string(), "zsh".to_string(), "ssh".to_string()]
}

fn default_inactivity_threshold() -> u64 {
    30
}

fn default_keys_to_send() -> String {
    "continue{ENTER}".to_string()
}

fn default_polling_interval() -> u64 {
    5
}

fn default_backend() -> String {
    "auto".to_string()
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            target_processes: default_target_processes(),
            inactivity_threshold_seconds: default_inactivity_threshold(),
            keys_to_send: default_keys_to_send(),
            polling_interval_seconds: default_polling_interval(),
            backend: default_backend(),
            logging: LoggingConfig::default(),
            advanced: AdvancedConfig::default(),
            process_overrides: HashMap::new(),
            exclusions: ExclusionConfig::default(),
            notifications: NotificationConfig::default(),
            exclusion_titles_lower: Vec::new(),
            exclusion_command_lines_lower: Vec::new(),
            effective_cache: HashMap::new(),
            default_effective: EffectiveConfig::default(),
        };
        config.build_optimization_indexes();
        config
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("TCM_"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;
        config.build_optimization_indexes();

        Ok(config)
    }

    /// Строит оптимизационные индексы для быстрого поиска
    pub fn build_optimization_indexes(&mut self) {
        // Предварительно нормализуем паттерны исключений
        self.exclusion_titles_lower = self
            .exclusions
            .window_titles
            .iter()
            .map(|pattern| pattern.to_lowercase())
            .collect();
        self.exclusion_command_lines_lower = self
            .exclusions
            .command_lines
            .iter()
            .map(|pattern| pattern.to_lowercase())
            .collect();

        // Итоговые настройки на каждое имя процесса с переопределениями
        self.default_effective = EffectiveConfig {
            inactivity_threshold: Duration::from_secs(self.inactivity_threshold_seconds),
            keys_to_send: self.keys_to_send.clone(),
        };
        self.effective_cache = self
            .process_overrides
            .iter()
            .map(|(name, over)| {
                let effective = EffectiveConfig {
                    inactivity_threshold: Duration::from_secs(
                        over.inactivity_threshold_seconds
                            .unwrap_or(self.inactivity_threshold_seconds),
                    ),
                    keys_to_send: over
                        .keys_to_send
                        .clone()
                        .unwrap_or_else(|| self.keys_to_send.clone()),
                };
                (name.clone(), effective)
            })
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация параметров цикла мониторинга
        if self.target_processes.is_empty() {
            anyhow::bail!("target_processes не должен быть пустым");
        }

        if self.inactivity_threshold_seconds == 0 {
            anyhow::bail!("inactivity_threshold_seconds должно быть больше 0");
        }

        if self.polling_interval_seconds == 0 {
            anyhow::bail!("polling_interval_seconds должно быть больше 0");
        }

        match self.backend.as_str() {
            "auto" | "wezterm" | "tmux" => {}
            _ => anyhow::bail!("Неверный бэкенд терминала: {}", self.backend),
        }

        // Валидация расширенных настроек
        if self.advanced.max_windows == 0 {
            anyhow::bail!("advanced.max_windows должно быть больше 0");
        }
        if self.advanced.window_operation_timeout == 0 {
            anyhow::bail!("advanced.window_operation_timeout должно быть больше 0");
        }

        // Валидация последовательностей клавиш
        keys::validate_sequence(&self.keys_to_send)
            .map_err(|e| anyhow::anyhow!("Неверная keys_to_send: {}", e))?;

        for (name, over) in &self.process_overrides {
            if let Some(threshold) = over.inactivity_threshold_seconds {
                if threshold == 0 {
                    anyhow::bail!(
                        "inactivity_threshold_seconds для процесса '{}' должно быть больше 0",
                        name
                    );
                }
            }
            if let Some(sequence) = &over.keys_to_send {
                keys::validate_sequence(sequence).map_err(|e| {
                    anyhow::anyhow!("Неверная keys_to_send для процесса '{}': {}", name, e)
                })?;
            }
        }

        Ok(())
    }

    /// Итоговые настройки для процесса: переопределение или глобальные значения
    pub fn effective_for(&self, process_name: &str) -> &EffectiveConfig {
        self.effective_cache
            .get(process_name)
            .unwrap_or(&self.default_effective)
    }

    /// Подпадает ли окно под правила исключения (по заголовку или командной строке).
    /// Вычисляется один раз при обнаружении окна.
    pub fn is_excluded(&self, context: &ProcessContext) -> bool {
        let title_lower = context.title.to_lowercase();
        if self
            .exclusion_titles_lower
            .iter()
            .any(|pattern| !pattern.is_empty() && title_lower.contains(pattern))
        {
            return true;
        }

        if let Some(command_line) = &context.command_line {
            let command_lower = command_line.to_lowercase();
            return self
                .exclusion_command_lines_lower
                .iter()
                .any(|pattern| !pattern.is_empty() && command_lower.contains(pattern));
        }

        false
    }

    /// Входит ли процесс в список отслеживаемых (регистронезависимо)
    pub fn is_target_process(&self, process_name: &str) -> bool {
        let name_lower = process_name.to_lowercase();
        self.target_processes
            .iter()
            .any(|target| target.to_lowercase() == name_lower)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.advanced.window_operation_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.advanced.retry_delay)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.advanced.metrics_interval)
    }

    /// Размер выборки для хеширования; 0 означает хешировать весь текст
    pub fn hash_sample_size(&self) -> usize {
        if self.advanced.use_hash_optimization {
            self.advanced.hash_sample_size
        } else {
            0
        }
    }
}
