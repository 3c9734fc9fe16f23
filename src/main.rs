use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod dispatch;
mod error;
mod evaluate;
mod fingerprint;
mod keys;
mod monitor;
mod notify;
mod services;
mod state;
mod utils;
mod window;

use config::Config;
use monitor::Monitor;
use services::create_backend;

#[derive(Parser, Debug)]
#[command(name = "tcm")]
#[command(about = "Монитор неактивности терминалов с автоматической отправкой клавиш")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "tcm.toml")]
    config: String,

    /// Режим сухого запуска (без реальных действий)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает logging.level из конфигурации)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(log_level, &config)?;

    info!("Запуск TCM Rust v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные действия отключены");
    }

    // Выбор бэкенда терминала (wezterm / tmux / auto)
    let backend = create_backend(config.clone(), args.dry_run).await?;
    info!("Выбран бэкенд терминала: {}", backend.name());

    let cancel = CancellationToken::new();
    let mut monitor = Monitor::new(config, backend);

    let monitor_cancel = cancel.clone();
    let monitor_handle = tokio::spawn(async move {
        if let Err(e) = monitor.run(monitor_cancel).await {
            error!("Мониторинг завершился с ошибкой: {}", e);
        }
    });

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");
    cancel.cancel();

    // Ожидаем завершения цикла (с таймаутом)
    let shutdown_timeout = tokio::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, monitor_handle).await {
        Ok(_) => info!("Мониторинг завершил работу корректно"),
        Err(_) => warn!("Таймаут при завершении мониторинга"),
    }

    info!("TCM Rust завершил работу");
    Ok(())
}

fn init_tracing(level: &str, config: &Config) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Env-переменная имеет приоритет над флагом и конфигурацией
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},{}", level, config.logging.filter)))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }

    Ok(())
}
