use crate::config::Config;
use crate::error::TcmError;
use crate::services::TerminalBackend;
use crate::window::WindowId;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Итог попытки отправить клавиши окну
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure(DispatchFailure),
    /// Остановка запрошена - оставшиеся повторы отменены
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    /// Окно исчезло - повторы не расходуются, окно уберёт следующая сверка
    WindowGone,
    /// Все попытки исчерпаны
    Exhausted,
}

/// Отправляет последовательность клавиш целевому окну с повторами.
///
/// Временные сбои (окно занято, таймаут операции) повторяются до
/// retry_attempts раз с фиксированной паузой retry_delay; исчезновение окна
/// и неповторяемые ошибки прерывают отправку сразу. Блокируется только
/// отправка для этого окна.
pub struct ResponseDispatcher {
    config: Arc<Config>,
    backend: Arc<dyn TerminalBackend>,
}

impl ResponseDispatcher {
    pub fn new(config: Arc<Config>, backend: Arc<dyn TerminalBackend>) -> Self {
        Self { config, backend }
    }

    pub async fn dispatch(
        &self,
        id: &WindowId,
        sequence: &str,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let total_attempts = self.config.advanced.retry_attempts + 1;

        for attempt in 1..=total_attempts {
            if cancel.is_cancelled() {
                return DispatchOutcome::Cancelled;
            }

            let send = self.backend.send_keys(id, sequence);
            match timeout(self.config.operation_timeout(), send).await {
                Ok(Ok(())) => {
                    debug!(
                        "Клавиши отправлены в {} с попытки {}/{}",
                        id, attempt, total_attempts
                    );
                    return DispatchOutcome::Success;
                }
                Ok(Err(TcmError::WindowGone(_))) => {
                    warn!("Окно {} исчезло во время отправки", id);
                    return DispatchOutcome::Failure(DispatchFailure::WindowGone);
                }
                // Неповторяемая ошибка: та же попытка провалится и в
                // следующий раз, повторы только жгут время
                Ok(Err(e)) if !e.is_transient() => {
                    warn!("Отправка в {} прервана без повторов: {}", id, e);
                    return DispatchOutcome::Failure(DispatchFailure::Exhausted);
                }
                Ok(Err(e)) => {
                    warn!(
                        "Попытка {}/{} отправки в {} не удалась: {}",
                        attempt, total_attempts, id, e
                    );
                }
                Err(_) => {
                    warn!(
                        "Попытка {}/{} отправки в {} не уложилась в {} секунд",
                        attempt,
                        total_attempts,
                        id,
                        self.config.advanced.window_operation_timeout
                    );
                }
            }

            // Пауза перед повтором; запрос остановки прерывает ожидание
            if attempt < total_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return DispatchOutcome::Cancelled,
                    _ = sleep(self.config.retry_delay()) => {}
                }
            }
        }

        DispatchOutcome::Failure(DispatchFailure::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::window::ProcessContext;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Copy)]
    enum Step {
        Ok,
        Transient,
        Internal,
        Gone,
        Hang,
    }

    struct ScriptedBackend {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(steps: &[Step]) -> Self {
            Self {
                script: Mutex::new(steps.iter().copied().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TerminalBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }

        async fn list_windows(&self) -> Result<Vec<(WindowId, ProcessContext)>> {
            Ok(Vec::new())
        }

        async fn read_text(&self, _id: &WindowId) -> Result<String> {
            Ok(String::new())
        }

        async fn send_keys(&self, id: &WindowId, _sequence: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().pop_front().unwrap_or(Step::Ok);
            match step {
                Step::Ok => Ok(()),
                Step::Transient => Err(TcmError::Transient("занято".to_string())),
                Step::Internal => Err(TcmError::Internal("клавиша не поддерживается".to_string())),
                Step::Gone => Err(TcmError::WindowGone(id.clone())),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn dispatcher(backend: Arc<ScriptedBackend>, retry_attempts: u32) -> ResponseDispatcher {
        let mut config = Config::default();
        config.advanced.retry_attempts = retry_attempts;
        config.advanced.retry_delay = 1;
        config.advanced.window_operation_timeout = 5;
        ResponseDispatcher::new(Arc::new(config), backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Ok]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_success() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Transient, Step::Transient, Step::Ok]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_all_attempts() {
        let backend = Arc::new(ScriptedBackend::new(&[
            Step::Transient,
            Step::Transient,
            Step::Transient,
            Step::Transient,
            Step::Transient,
        ]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Failure(DispatchFailure::Exhausted));
        // retry_attempts = 3 означает 4 попытки всего и ни одной больше
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_aborts_without_retries() {
        // Бэкенд отвергает последовательность детерминированно -
        // повторы гарантированно провалятся так же
        let backend = Arc::new(ScriptedBackend::new(&[Step::Internal, Step::Internal]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "{UP}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Failure(DispatchFailure::Exhausted));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_gone_aborts_immediately() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Gone]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Failure(DispatchFailure::WindowGone));
        // Повторы не расходуются
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_counts_as_transient_timeout() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Hang, Step::Ok]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &CancellationToken::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_any_attempt() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Ok]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = dispatcher
            .dispatch(&WindowId::new("%1"), "continue{ENTER}", &cancel)
            .await;
        assert_eq!(outcome, DispatchOutcome::Cancelled);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_retry_delay() {
        let backend = Arc::new(ScriptedBackend::new(&[Step::Transient, Step::Ok]));
        let dispatcher = dispatcher(backend.clone(), 3);

        let cancel = CancellationToken::new();
        let id = WindowId::new("%1");

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            // Отмена приходит во время паузы между попытками
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });

        let outcome = dispatcher.dispatch(&id, "continue{ENTER}", &cancel).await;
        assert_eq!(outcome, DispatchOutcome::Cancelled);
        assert_eq!(backend.calls(), 1);
    }
}
