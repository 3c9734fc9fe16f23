use crate::config::Config;
use crate::debug_if_enabled;
use crate::dispatch::{DispatchFailure, DispatchOutcome, ResponseDispatcher};
use crate::error::{Result, TcmError};
use crate::evaluate::{evaluate, Eligibility};
use crate::fingerprint::Fingerprint;
use crate::notify::DesktopNotifier;
use crate::services::TerminalBackend;
use crate::state::WindowStateStore;
use crate::window::WindowId;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Счётчики работы монитора для периодического лога метрик
#[derive(Debug, Default)]
struct MonitorStats {
    cycles: u64,
    dispatch_success: u64,
    dispatch_failure: u64,
}

/// Главный цикл мониторинга: сверка окон, чтение текста, оценка
/// неактивности и отправка клавиш - один повторяющийся проход,
/// единственная точка приостановки которого - межцикловый sleep.
pub struct Monitor {
    config: Arc<Config>,
    backend: Arc<dyn TerminalBackend>,
    store: WindowStateStore,
    dispatcher: ResponseDispatcher,
    notifier: DesktopNotifier,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(config: Arc<Config>, backend: Arc<dyn TerminalBackend>) -> Self {
        let store = WindowStateStore::new(config.clone());
        let dispatcher = ResponseDispatcher::new(config.clone(), backend.clone());
        let notifier = DesktopNotifier::new(&config);
        Self {
            config,
            backend,
            store,
            dispatcher,
            notifier,
            stats: MonitorStats::default(),
        }
    }

    /// Запустить мониторинг до запроса остановки.
    ///
    /// Ошибки отдельных окон ловятся и логируются внутри цикла; наружу
    /// выходит только фатальный отказ источника окон. Остановка срабатывает
    /// на границе цикла - текущий проход завершается без прерывания.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("🚀 Запуск мониторинга (бэкенд: {})", self.backend.name());
        info!(
            "Целевые процессы: {}",
            self.config.target_processes.join(", ")
        );
        info!(
            "Порог неактивности: {}с, интервал опроса: {}с",
            self.config.inactivity_threshold_seconds, self.config.polling_interval_seconds
        );

        let polling_interval = self.config.polling_interval();
        let mut last_metrics_log = Instant::now();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let cycle_start = Instant::now();

            match self.run_cycle(&cancel).await {
                Ok(()) => {}
                Err(e @ TcmError::SourceFailed(_)) => {
                    error!("Фатальная ошибка источника окон: {}", e);
                    info!("Мониторинг остановлен из-за отказа источника");
                    return Err(e);
                }
                Err(e) => {
                    error!("Ошибка в цикле мониторинга: {}", e);
                    info!("Продолжаем мониторинг после ошибки...");
                }
            }

            self.stats.cycles += 1;

            if last_metrics_log.elapsed() >= self.config.metrics_interval() {
                self.log_metrics();
                last_metrics_log = Instant::now();
            }

            let cycle_duration = cycle_start.elapsed();
            if cycle_duration > polling_interval * 2 {
                warn!(
                    "Цикл мониторинга занял {:.2}с (целевой интервал: {}с)",
                    cycle_duration.as_secs_f64(),
                    self.config.polling_interval_seconds
                );
            }

            let sleep_for = polling_interval.saturating_sub(cycle_duration);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(sleep_for) => {}
            }
        }

        info!("Мониторинг терминалов остановлен корректно");
        Ok(())
    }

    /// Один проход: перечисление -> сверка -> чтение -> оценка -> отправка
    async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<()> {
        let windows = self.backend.list_windows().await?;

        let delta = self.store.reconcile(&windows, Instant::now());
        for (id, context) in &windows {
            if delta.added.contains(id) {
                info!("Новое окно в отслеживании: {} - {}", id, context);
            }
        }
        for evicted in &delta.removed {
            info!(
                "Окно закрыто: {} ({}) - отслеживалось {:.1}с, изменений: {}",
                evicted.id,
                evicted.process_name,
                evicted.tracked_for.as_secs_f64(),
                evicted.change_count
            );
        }
        if delta.skipped_over_limit > 0 {
            warn!(
                "Достигнут лимит max_windows ({}): {} окон не взято в отслеживание",
                self.config.advanced.max_windows, delta.skipped_over_limit
            );
        }

        if self.store.is_empty() {
            debug!("Целевых окон нет - цикл пропущен");
            return Ok(());
        }

        self.observe_windows().await;
        self.dispatch_eligible(cancel).await;

        Ok(())
    }

    /// Прочитать текст всех неисключённых окон параллельно и зафиксировать
    /// свежие отпечатки. Количество задач ограничено размером хранилища,
    /// который в свою очередь ограничен max_windows.
    async fn observe_windows(&self) {
        let sample_size = self.config.hash_sample_size();
        let op_timeout = self.config.operation_timeout();

        let mut reads: JoinSet<(WindowId, Result<Fingerprint>)> = JoinSet::new();
        for state in self.store.snapshot() {
            if state.excluded {
                continue;
            }
            let backend = self.backend.clone();
            let id = state.id.clone();
            reads.spawn(async move {
                let result = match timeout(op_timeout, backend.read_text(&id)).await {
                    Ok(Ok(text)) => Ok(Fingerprint::compute(&text, sample_size)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(TcmError::Timeout(op_timeout.as_secs())),
                };
                (id, result)
            });
        }

        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((id, Ok(fingerprint))) => {
                    let changed = self.store.observe(&id, fingerprint, Instant::now());
                    if changed {
                        debug_if_enabled!("Активность в окне {}: отпечаток {}", id, fingerprint);
                    }
                }
                Ok((id, Err(TcmError::WindowGone(_)))) => {
                    // Уберёт следующая сверка
                    debug!("Окно {} исчезло при чтении текста", id);
                }
                Ok((id, Err(e))) => {
                    // Нет новых данных в этом цикле - не считается изменением
                    debug!("Не удалось прочитать текст окна {}: {}", id, e);
                }
                Err(e) => error!("Задача чтения текста прервана: {}", e),
            }
        }
    }

    /// Оценить все окна по снимку и отправить клавиши подходящим,
    /// в стабильном порядке по идентификатору
    async fn dispatch_eligible(&mut self, cancel: &CancellationToken) {
        let now = Instant::now();
        let failure_ceiling = self.config.advanced.retry_attempts;

        for state in self.store.snapshot() {
            let effective = self.config.effective_for(&state.process_name);

            match evaluate(&state, effective, failure_ceiling, now) {
                Eligibility::NotEligible(reason) => {
                    debug_if_enabled!("Окно {} пропущено: {}", state.id, reason);
                }
                Eligibility::Eligible => {
                    let idle_secs = now.duration_since(state.last_changed_at).as_secs();
                    info!(
                        "✅ ACTION: Отправка клавиш в {} ({}) после {}с неактивности",
                        state.process_name, state.id, idle_secs
                    );

                    let outcome = self
                        .dispatcher
                        .dispatch(&state.id, &effective.keys_to_send, cancel)
                        .await;

                    match outcome {
                        DispatchOutcome::Success => {
                            self.store.record_action(&state.id, Instant::now(), true);
                            self.stats.dispatch_success += 1;
                            self.notifier.notify_action(&state, idle_secs).await;
                        }
                        DispatchOutcome::Failure(DispatchFailure::WindowGone) => {
                            // Счётчик отказов не трогаем: окно уйдёт при сверке
                            warn!("Окно {} исчезло - отправка отменена", state.id);
                        }
                        DispatchOutcome::Failure(DispatchFailure::Exhausted) => {
                            self.store.record_action(&state.id, Instant::now(), false);
                            self.stats.dispatch_failure += 1;
                            warn!(
                                "Не удалось отправить клавиши в {} ({})",
                                state.process_name, state.id
                            );
                        }
                        DispatchOutcome::Cancelled => {
                            info!("Отправка прервана запросом остановки");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn log_metrics(&self) {
        info!(
            "Статистика: циклов {}, окон в отслеживании {}, отправок успешных {}, неуспешных {}",
            self.stats.cycles,
            self.store.len(),
            self.stats.dispatch_success,
            self.stats.dispatch_failure
        );
    }
}
