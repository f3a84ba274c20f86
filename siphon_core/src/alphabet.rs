use std::fmt;

/// Ordered set of symbols tried at every position.
///
/// Order is significant: the sequential finder returns the first accepted
/// symbol, so earlier symbols win ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Builds an alphabet from `symbols`, dropping repeats but keeping the
    /// position of each symbol's first occurrence.
    pub fn new(symbols: impl IntoIterator<Item = char>) -> Self {
        let mut unique = Vec::new();
        for symbol in symbols {
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        Self { symbols: unique }
    }

    /// Lowercase ASCII letters followed by the decimal digits.
    pub fn lowercase_alphanumeric() -> Self {
        Self::new(('a'..='z').chain('0'..='9'))
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.symbols.iter().copied()
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.symbols.contains(&symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::lowercase_alphanumeric()
    }
}

impl From<&str> for Alphabet {
    fn from(value: &str) -> Self {
        Self::new(value.chars())
    }
}

impl FromIterator<char> for Alphabet {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.symbols {
            write!(f, "{symbol}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alphabet_is_letters_then_digits() {
        let alphabet = Alphabet::default();
        assert_eq!(alphabet.len(), 36);
        assert_eq!(
            alphabet.to_string(),
            "abcdefghijklmnopqrstuvwxyz0123456789"
        );
        assert_eq!(alphabet.symbols().first(), Some(&'a'));
        assert_eq!(alphabet.symbols().last(), Some(&'9'));
    }

    #[test]
    fn duplicates_keep_first_position() {
        let alphabet = Alphabet::from("b5ab5");
        assert_eq!(alphabet.symbols(), &['b', '5', 'a']);
    }

    #[test]
    fn empty_alphabet() {
        let alphabet: Alphabet = "".chars().collect();
        assert!(alphabet.is_empty());
        assert_eq!(alphabet.iter().count(), 0);
        assert!(!alphabet.contains('a'));
    }
}
