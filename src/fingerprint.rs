use sha2::{Digest, Sha256};
use std::fmt;

/// Компактный отпечаток текстового содержимого окна.
///
/// Используется для детекции изменений без хранения и сравнения полного
/// текста. SHA-256 детерминирован и практически исключает коллизии на
/// реальных объёмах текста; криптостойкость здесь не требование.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Вычислить отпечаток текста.
    ///
    /// При `sample_size == 0` хешируется весь текст. При `sample_size > 0`
    /// хешируется только ограниченный префикс - дешевле на очень больших
    /// буферах ценой точности детекции. Срез выравнивается по границе
    /// символа, чтобы не резать UTF-8 посередине.
    pub fn compute(text: &str, sample_size: usize) -> Self {
        let sampled = if sample_size == 0 || text.len() <= sample_size {
            text
        } else {
            let mut end = sample_size;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        };

        let mut hasher = Sha256::new();
        hasher.update(sampled.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Первые 8 байт достаточно для логов
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute("hello world", 0);
        let b = Fingerprint::compute("hello world", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_texts_differ() {
        let a = Fingerprint::compute("build output line 1", 0);
        let b = Fingerprint::compute("build output line 2", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_text() {
        let empty = Fingerprint::compute("", 0);
        let nonempty = Fingerprint::compute("x", 0);
        assert_ne!(empty, nonempty);
        assert_eq!(empty, Fingerprint::compute("", 0));
    }

    #[test]
    fn test_sample_prefix_ignores_tail() {
        // Тексты совпадают в первых 10 байтах - при выборке различия не видны
        let a = Fingerprint::compute("0123456789aaaa", 10);
        let b = Fingerprint::compute("0123456789bbbb", 10);
        assert_eq!(a, b);

        // Полный хеш различия видит
        let a_full = Fingerprint::compute("0123456789aaaa", 0);
        let b_full = Fingerprint::compute("0123456789bbbb", 0);
        assert_ne!(a_full, b_full);
    }

    #[test]
    fn test_sample_respects_char_boundary() {
        // Кириллица - 2 байта на символ; выборка не должна паниковать
        let text = "привет мир, это длинный текст";
        let fp = Fingerprint::compute(text, 7);
        assert_eq!(fp, Fingerprint::compute(text, 7));
    }

    #[test]
    fn test_sample_equals_full_for_short_text() {
        let a = Fingerprint::compute("short", 1000);
        let b = Fingerprint::compute("short", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_is_short_hex() {
        let fp = Fingerprint::compute("text", 0);
        let shown = format!("{fp}");
        assert_eq!(shown.len(), 16);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
