use crate::error::{Result, TcmError};
use std::fmt;

/// Именованные специальные клавиши, допустимые в последовательности
/// вида `continue{ENTER}`. Токены регистронезависимы.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Enter,
    Tab,
    Space,
    Backspace,
    Delete,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl SpecialKey {
    fn parse(token: &str) -> Option<Self> {
        let upper = token.to_uppercase();
        let key = match upper.as_str() {
            "ENTER" => Self::Enter,
            "TAB" => Self::Tab,
            "SPACE" => Self::Space,
            "BACKSPACE" => Self::Backspace,
            "DELETE" => Self::Delete,
            "ESC" | "ESCAPE" => Self::Escape,
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            "HOME" => Self::Home,
            "END" => Self::End,
            "PGUP" => Self::PageUp,
            "PGDN" => Self::PageDown,
            _ => {
                // F1..F12
                let n: u8 = upper.strip_prefix('F')?.parse().ok()?;
                if (1..=12).contains(&n) {
                    Self::F(n)
                } else {
                    return None;
                }
            }
        };
        Some(key)
    }

    /// Имя клавиши в нотации tmux send-keys
    pub fn tmux_name(&self) -> String {
        match self {
            Self::Enter => "Enter".to_string(),
            Self::Tab => "Tab".to_string(),
            Self::Space => "Space".to_string(),
            Self::Backspace => "BSpace".to_string(),
            Self::Delete => "DC".to_string(),
            Self::Escape => "Escape".to_string(),
            Self::Up => "Up".to_string(),
            Self::Down => "Down".to_string(),
            Self::Left => "Left".to_string(),
            Self::Right => "Right".to_string(),
            Self::Home => "Home".to_string(),
            Self::End => "End".to_string(),
            Self::PageUp => "PageUp".to_string(),
            Self::PageDown => "PageDown".to_string(),
            Self::F(n) => format!("F{n}"),
        }
    }

    /// Буквальный текстовый эквивалент, если клавиша им обладает.
    /// Нужен бэкендам, умеющим отправлять только текст (wezterm send-text).
    pub fn as_literal(&self) -> Option<&'static str> {
        match self {
            Self::Enter => Some("\r"),
            Self::Tab => Some("\t"),
            Self::Space => Some(" "),
            Self::Escape => Some("\x1b"),
            _ => None,
        }
    }
}

impl fmt::Display for SpecialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F(n) => write!(f, "{{F{n}}}"),
            other => write!(f, "{{{}}}", other.tmux_name().to_uppercase()),
        }
    }
}

/// Элемент разобранной последовательности: буквальный текст или спец-клавиша
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySegment {
    Text(String),
    Special(SpecialKey),
}

/// Разобрать последовательность клавиш на сегменты.
///
/// Грамматика: буквальные символы плюс токены в фигурных скобках
/// (`{ENTER}`, `{TAB}`, ...). Неизвестный токен и незакрытая скобка -
/// ошибка конфигурации.
pub fn parse_sequence(sequence: &str) -> Result<Vec<KeySegment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = sequence.chars();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            literal.push(ch);
            continue;
        }

        let mut token = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            token.push(inner);
        }

        if !closed {
            return Err(TcmError::Internal(format!(
                "Незакрытая скобка в последовательности клавиш: '{sequence}'"
            )));
        }

        let key = SpecialKey::parse(&token).ok_or_else(|| {
            TcmError::Internal(format!(
                "Неизвестная специальная клавиша '{{{token}}}' в последовательности '{sequence}'"
            ))
        })?;

        if !literal.is_empty() {
            segments.push(KeySegment::Text(std::mem::take(&mut literal)));
        }
        segments.push(KeySegment::Special(key));
    }

    if !literal.is_empty() {
        segments.push(KeySegment::Text(literal));
    }

    Ok(segments)
}

/// Проверить последовательность без построения сегментов.
/// Используется при валидации конфигурации.
pub fn validate_sequence(sequence: &str) -> Result<()> {
    if sequence.is_empty() {
        return Err(TcmError::Internal(
            "Пустая последовательность клавиш".to_string(),
        ));
    }
    parse_sequence(sequence).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_sequence() {
        let segments = parse_sequence("continue{ENTER}").unwrap();
        assert_eq!(
            segments,
            vec![
                KeySegment::Text("continue".to_string()),
                KeySegment::Special(SpecialKey::Enter),
            ]
        );
    }

    #[test]
    fn test_parse_only_text() {
        let segments = parse_sequence("hello").unwrap();
        assert_eq!(segments, vec![KeySegment::Text("hello".to_string())]);
    }

    #[test]
    fn test_parse_multiple_specials() {
        let segments = parse_sequence("{ESC}q{ENTER}").unwrap();
        assert_eq!(
            segments,
            vec![
                KeySegment::Special(SpecialKey::Escape),
                KeySegment::Text("q".to_string()),
                KeySegment::Special(SpecialKey::Enter),
            ]
        );
    }

    #[test]
    fn test_tokens_case_insensitive() {
        let segments = parse_sequence("{enter}").unwrap();
        assert_eq!(segments, vec![KeySegment::Special(SpecialKey::Enter)]);
    }

    #[test]
    fn test_function_keys() {
        let segments = parse_sequence("{F5}").unwrap();
        assert_eq!(segments, vec![KeySegment::Special(SpecialKey::F(5))]);
        assert!(parse_sequence("{F13}").is_err());
        assert!(parse_sequence("{F0}").is_err());
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(parse_sequence("x{BOGUS}").is_err());
    }

    #[test]
    fn test_unclosed_brace_rejected() {
        assert!(parse_sequence("continue{ENTER").is_err());
    }

    #[test]
    fn test_validate_sequence() {
        assert!(validate_sequence("continue{ENTER}").is_ok());
        assert!(validate_sequence("").is_err());
        assert!(validate_sequence("{NOPE}").is_err());
    }

    #[test]
    fn test_tmux_names() {
        assert_eq!(SpecialKey::Backspace.tmux_name(), "BSpace");
        assert_eq!(SpecialKey::Delete.tmux_name(), "DC");
        assert_eq!(SpecialKey::F(12).tmux_name(), "F12");
    }

    #[test]
    fn test_literal_equivalents() {
        assert_eq!(SpecialKey::Enter.as_literal(), Some("\r"));
        assert_eq!(SpecialKey::Home.as_literal(), None);
    }
}
