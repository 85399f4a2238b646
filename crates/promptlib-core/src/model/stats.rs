use serde::Serialize;

/// Size figures for a prompt body, as shown in the detail view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromptStats {
    pub words: usize,
    pub characters: usize,
    pub non_whitespace: usize,
}

impl PromptStats {
    #[must_use]
    pub fn of(body: &str) -> Self {
        Self {
            words: body.split_whitespace().count(),
            characters: body.chars().count(),
            non_whitespace: body.chars().filter(|c| !c.is_whitespace()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PromptStats;

    #[test]
    fn counts_words_and_characters() {
        let stats = PromptStats::of("Review this  code\nfor bugs");
        assert_eq!(stats.words, 5);
        assert_eq!(stats.characters, 26);
        assert_eq!(stats.non_whitespace, 21);
    }

    #[test]
    fn empty_body_is_zero() {
        assert_eq!(PromptStats::of("   "), PromptStats {
            words: 0,
            characters: 3,
            non_whitespace: 0,
        });
    }

    #[test]
    fn counts_unicode_scalars_not_bytes() {
        let stats = PromptStats::of("café ☕");
        assert_eq!(stats.characters, 6);
        assert_eq!(stats.words, 2);
    }
}
