//! Identifier obfuscation for the preprocess-only mode.
use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::lexer::{Token, TokenKind};

const GLYPHS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const FIXED_SEED: u64 = 0x5eed_5eed_5eed_5eed;

/// Rewrites every identifier to a random 16-character name, consistently:
/// the same source identifier always maps to the same replacement.
pub struct Obfuscator {
    replacements: HashMap<String, String>,
    used: HashSet<String>,
    rng: StdRng,
    in_vector_literal: bool,
}

impl Obfuscator {
    /// With `fixed_seed` the mapping is reproducible from run to run;
    /// otherwise the generator is seeded from system entropy.
    pub fn new(fixed_seed: bool) -> Self {
        Self {
            replacements: HashMap::new(),
            used: HashSet::new(),
            rng: if fixed_seed {
                StdRng::seed_from_u64(FIXED_SEED)
            } else {
                StdRng::from_entropy()
            },
            in_vector_literal: false,
        }
    }

    pub fn rewrite(&mut self, token: &mut Token) {
        match token.kind {
            TokenKind::IntegerBase => self.in_vector_literal = true,
            // The digits of a based literal can lex as identifiers (hex
            // digits, x/z bits); renaming them would corrupt the literal.
            TokenKind::Number if self.in_vector_literal => {}
            TokenKind::Identifier => {
                if self.in_vector_literal && is_possible_vector_digits(&token.text) {
                    return;
                }
                self.in_vector_literal = false;
                token.text = self.replacement(&token.text);
            }
            _ => self.in_vector_literal = false,
        }
    }

    fn replacement(&mut self, name: &str) -> String {
        if let Some(existing) = self.replacements.get(name) {
            return existing.clone();
        }
        let fresh = loop {
            let candidate: String = (0..16)
                .map(|_| GLYPHS[self.rng.gen_range(0..GLYPHS.len())] as char)
                .collect();
            if self.used.insert(candidate.clone()) {
                break candidate;
            }
        };
        self.replacements.insert(name.to_owned(), fresh.clone());
        fresh
    }
}

fn is_possible_vector_digits(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_hexdigit() || matches!(c, 'x' | 'X' | 'z' | 'Z' | '?' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, source::BufferId};

    fn obfuscate(text: &str) -> String {
        let mut obfuscator = Obfuscator::new(true);
        let mut out = String::new();
        for mut token in lexer::lex(text, BufferId::new(0)) {
            obfuscator.rewrite(&mut token);
            token.write_to(&mut out, true);
        }
        out
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let text = "module m; wire x; endmodule";
        assert_eq!(obfuscate(text), obfuscate(text));
    }

    #[test]
    fn mapping_is_consistent_and_injective() {
        let mut obfuscator = Obfuscator::new(true);
        let a1 = obfuscator.replacement("a");
        let b = obfuscator.replacement("b");
        let a2 = obfuscator.replacement("a");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.len(), 16);
        assert!(a1.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn keywords_survive() {
        let out = obfuscate("module m; endmodule");
        assert!(out.starts_with("module "));
        assert!(out.ends_with(" endmodule"));
        assert!(!out.contains(" m;"));
    }

    #[test]
    fn vector_literal_digits_are_verbatim() {
        let out = obfuscate("wire [3:0] x = 4'b1010;");
        assert!(out.contains("4'b1010"));
        let out = obfuscate("wire [15:0] y = 16'hDEAD;");
        assert!(out.contains("16'hDEAD"));
        let out = obfuscate("wire [3:0] z = 4'bxz01;");
        assert!(out.contains("4'bxz01"));
    }

    #[test]
    fn identifier_after_literal_is_still_renamed() {
        // `beef` is hex-digit-shaped, but once a non-digit token ends the
        // literal it must be treated as a normal identifier again.
        let out = obfuscate("x = 4'hF; beef = 1;");
        assert!(!out.contains("beef"));
    }
}
