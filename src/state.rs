//! Хранилище всего изменяемого состояния отслеживаемых окон: отпечатки,
//! отметки изменений и действий, счётчики отказов. Решений о пригодности
//! окна не принимает (это `evaluate`) и ввода-вывода не выполняет.
//! Мутации разных окон могут идти параллельно; мутации одного окна
//! сериализуются поключевой блокировкой карты.

use crate::config::Config;
use crate::fingerprint::Fingerprint;
use crate::window::{ProcessContext, WindowId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Состояние одного отслеживаемого окна
#[derive(Debug, Clone)]
pub struct WindowState {
    pub id: WindowId,
    pub process_name: String,
    pub title: String,
    pub last_fingerprint: Option<Fingerprint>,
    pub last_changed_at: Instant,
    pub created_at: Instant,
    pub last_action_at: Option<Instant>,
    pub consecutive_failures: u32,
    pub excluded: bool,
    pub change_count: u64,
}

/// Запись об окне, убранном из отслеживания (для логирования вызывающим)
#[derive(Debug, Clone)]
pub struct EvictedWindow {
    pub id: WindowId,
    pub process_name: String,
    pub tracked_for: Duration,
    pub change_count: u64,
}

/// Результат сверки наблюдаемых окон с отслеживаемыми
#[derive(Debug, Default)]
pub struct ReconcileDelta {
    pub added: Vec<WindowId>,
    pub removed: Vec<EvictedWindow>,
    /// Сколько новых окон не взято в отслеживание из-за лимита max_windows
    pub skipped_over_limit: usize,
}

pub struct WindowStateStore {
    config: Arc<Config>,
    windows: DashMap<WindowId, WindowState>,
}

impl WindowStateStore {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Сверить список наблюдаемых окон с отслеживаемыми.
    ///
    /// Для каждого нового идентификатора создаётся свежее состояние
    /// (отпечаток не задан, `excluded` вычислен по правилам исключения);
    /// каждое отслеживаемое окно, отсутствующее в списке, убирается.
    pub fn reconcile(
        &self,
        observed: &[(WindowId, ProcessContext)],
        now: Instant,
    ) -> ReconcileDelta {
        let mut delta = ReconcileDelta::default();

        let observed_ids: HashSet<&WindowId> = observed.iter().map(|(id, _)| id).collect();

        // Убираем окна, которых источник больше не видит
        let gone: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|entry| !observed_ids.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for id in gone {
            if let Some((_, state)) = self.windows.remove(&id) {
                delta.removed.push(EvictedWindow {
                    id: state.id,
                    process_name: state.process_name,
                    tracked_for: now.duration_since(state.created_at),
                    change_count: state.change_count,
                });
            }
        }

        // Заводим состояние для новых окон с учётом лимита
        for (id, context) in observed {
            if self.windows.contains_key(id) {
                continue;
            }
            if self.windows.len() >= self.config.advanced.max_windows {
                delta.skipped_over_limit += 1;
                continue;
            }

            let state = WindowState {
                id: id.clone(),
                process_name: context.process_name.clone(),
                title: context.title.clone(),
                last_fingerprint: None,
                last_changed_at: now,
                created_at: now,
                last_action_at: None,
                consecutive_failures: 0,
                excluded: self.config.is_excluded(context),
                change_count: 0,
            };
            self.windows.insert(id.clone(), state);
            delta.added.push(id.clone());
        }

        delta
    }

    /// Зафиксировать свежий отпечаток текста окна.
    ///
    /// Возвращает true, если отпечаток изменился (или был не задан) - тогда
    /// таймер неактивности сбрасывается и счётчик отказов обнуляется:
    /// изменение текста начинает новый эпизод неактивности. Для
    /// неотслеживаемого окна - no-op, false.
    pub fn observe(&self, id: &WindowId, fingerprint: Fingerprint, now: Instant) -> bool {
        let Some(mut state) = self.windows.get_mut(id) else {
            return false;
        };

        if state.last_fingerprint == Some(fingerprint) {
            return false;
        }

        state.last_fingerprint = Some(fingerprint);
        state.last_changed_at = now;
        state.change_count += 1;
        state.consecutive_failures = 0;
        true
    }

    /// Зафиксировать результат отправки клавиш окну.
    ///
    /// Момент действия записывается и при неудаче - кулдаун оценщика
    /// гасит шторм повторов между циклами.
    pub fn record_action(&self, id: &WindowId, now: Instant, success: bool) {
        let Some(mut state) = self.windows.get_mut(id) else {
            return;
        };

        state.last_action_at = Some(now);
        if success {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
        }
    }

    /// Снимок всех состояний на момент вызова, в стабильном порядке по
    /// идентификатору - порядок отправки детерминирован
    pub fn snapshot(&self) -> Vec<WindowState> {
        let mut states: Vec<WindowState> = self
            .windows
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &WindowId) -> Option<WindowState> {
        self.windows.get(id).map(|entry| entry.value().clone())
    }
}
