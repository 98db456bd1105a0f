use crate::error::{GrammarError, GrammarResult};
use fnv::FnvHashMap;

/// Interned token id. Tags, source words and target words share one space.
pub type Symbol = u32;

pub const NULL_WORD: &str = "__NULL__";
pub const NULL_WORD_ID: Symbol = 0;

/// String <-> integer interning. Id 0 is always the NULL word.
#[derive(Debug, Clone)]
pub struct TokenDictionary {
    index: FnvHashMap<String, Symbol>,
    tokens: Vec<String>,
}

impl Default for TokenDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDictionary {
    pub fn new() -> Self {
        let mut index = FnvHashMap::default();
        index.insert(NULL_WORD.to_string(), NULL_WORD_ID);
        Self {
            index,
            tokens: vec![NULL_WORD.to_string()],
        }
    }

    /// Returns the id of `token`, interning it on first sight.
    pub fn index(&mut self, token: &str) -> Symbol {
        if let Some(&id) = self.index.get(token) {
            return id;
        }
        let id = self.tokens.len() as Symbol;
        self.index.insert(token.to_string(), id);
        self.tokens.push(token.to_string());
        id
    }

    pub fn get(&self, token: &str) -> Option<Symbol> {
        self.index.get(token).copied()
    }

    pub fn token(&self, id: Symbol) -> GrammarResult<&str> {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .ok_or(GrammarError::UnknownSymbol(id))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        // NULL is always present
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_word_is_reserved() {
        let dict = TokenDictionary::new();
        assert_eq!(dict.get(NULL_WORD), Some(NULL_WORD_ID));
        assert_eq!(dict.token(NULL_WORD_ID).unwrap(), NULL_WORD);
    }

    #[test]
    fn test_interning_is_stable() {
        let mut dict = TokenDictionary::new();
        let a = dict.index("dog");
        let b = dict.index("cat");
        assert_eq!(dict.index("dog"), a);
        assert_ne!(a, b);
        assert_eq!(dict.token(b).unwrap(), "cat");
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_out_of_range_lookup_fails() {
        let dict = TokenDictionary::new();
        assert!(matches!(dict.token(42), Err(GrammarError::UnknownSymbol(42))));
    }
}
