use crate::config::EffectiveConfig;
use crate::state::WindowState;
use std::fmt;
use tokio::time::Instant;

/// Причина, по которой окно не подлежит отправке клавиш в этом цикле
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligibleReason {
    /// Окно исключено правилами по заголовку/командной строке
    Excluded,
    /// Текст ещё ни разу не наблюдался в этом запуске
    InsufficientData,
    /// Достигнут потолок последовательных отказов - окно пропускается
    /// до конца текущего эпизода неактивности
    FailureCeiling,
    /// Порог неактивности ещё не превышен
    NotIdleLongEnough,
    /// Действие уже отправлялось недавно - защита от повторного
    /// срабатывания на том же неизменном тексте
    Cooldown,
}

impl fmt::Display for NotEligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Excluded => "excluded",
            Self::InsufficientData => "insufficient-data",
            Self::FailureCeiling => "failure-ceiling",
            Self::NotIdleLongEnough => "not-idle-long-enough",
            Self::Cooldown => "cooldown",
        };
        write!(f, "{reason}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotEligible(NotEligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Решить, подлежит ли окно отправке клавиш.
///
/// Чистая функция без побочных эффектов: всё состояние приходит снимком,
/// текущее время передаётся явно. Правила применяются по порядку; первое
/// сработавшее даёт причину отказа.
pub fn evaluate(
    state: &WindowState,
    cfg: &EffectiveConfig,
    failure_ceiling: u32,
    now: Instant,
) -> Eligibility {
    if state.excluded {
        return Eligibility::NotEligible(NotEligibleReason::Excluded);
    }

    if state.last_fingerprint.is_none() {
        return Eligibility::NotEligible(NotEligibleReason::InsufficientData);
    }

    if state.consecutive_failures >= failure_ceiling {
        return Eligibility::NotEligible(NotEligibleReason::FailureCeiling);
    }

    let idle_for = now.duration_since(state.last_changed_at);
    if idle_for < cfg.inactivity_threshold {
        return Eligibility::NotEligible(NotEligibleReason::NotIdleLongEnough);
    }

    if let Some(last_action) = state.last_action_at {
        if now.duration_since(last_action) < cfg.inactivity_threshold {
            return Eligibility::NotEligible(NotEligibleReason::Cooldown);
        }
    }

    Eligibility::Eligible
}
