use super::types::{Document, Passage};

#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Splits documents into passages sized for the embedding model.
///
/// Text is cut at paragraph breaks, then sentence boundaries; sentences
/// are packed greedily up to `chunk_size` characters, and each new
/// passage starts with up to `chunk_overlap` characters of trailing
/// sentences from the previous one.
pub struct PassageSplitter {
    config: SplitConfig,
}

impl PassageSplitter {
    #[must_use]
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Passage> {
        let units = sentence_units(&document.content);
        let chunks = pack_units(&units, self.config.chunk_size, self.config.chunk_overlap);

        chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Passage {
                text,
                source: document.metadata.source.clone(),
                chunk_index,
            })
            .collect()
    }
}

/// Cut text into sentence-level units: paragraph breaks first, then
/// terminator-plus-whitespace boundaries inside each paragraph.
fn sentence_units(text: &str) -> Vec<String> {
    let mut units = Vec::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let mut current = String::new();
        let mut chars = paragraph.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|next| next.is_whitespace())
            {
                let unit = current.trim();
                if !unit.is_empty() {
                    units.push(unit.to_owned());
                }
                current.clear();
            }
        }
        let tail = current.trim();
        if !tail.is_empty() {
            units.push(tail.to_owned());
        }
    }

    units
}

fn pack_units(units: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    let flush = |current: &[String], chunks: &mut Vec<String>| {
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
    };

    for unit in units {
        let unit_len = unit.chars().count();

        // A single unit longer than the window is hard-cut on its own.
        if unit_len > chunk_size {
            flush(&current, &mut chunks);
            current.clear();
            current_len = 0;
            chunks.extend(char_windows(unit, chunk_size));
            continue;
        }

        if current_len > 0 && current_len + unit_len + 1 > chunk_size {
            flush(&current, &mut chunks);
            let (overlap, overlap_len) = trailing_overlap(&current, chunk_overlap);
            current = overlap;
            current_len = overlap_len;
        }

        current_len += unit_len + usize::from(current_len > 0);
        current.push(unit.clone());
    }

    flush(&current, &mut chunks);
    chunks
}

/// Trailing units of the closed chunk totalling at most `budget` chars.
fn trailing_overlap(units: &[String], budget: usize) -> (Vec<String>, usize) {
    let mut overlap = Vec::new();
    let mut len = 0usize;
    for unit in units.iter().rev() {
        let unit_len = unit.chars().count();
        if len + unit_len > budget {
            break;
        }
        len += unit_len + usize::from(len > 0);
        overlap.push(unit.clone());
    }
    overlap.reverse();
    (overlap, len)
}

fn char_windows(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::types::DocumentMetadata;

    fn make_doc(content: &str) -> Document {
        Document {
            content: content.to_owned(),
            metadata: DocumentMetadata {
                source: "manual.txt".to_owned(),
                content_type: "text/plain".to_owned(),
            },
        }
    }

    #[test]
    fn empty_document_yields_no_passages() {
        let splitter = PassageSplitter::new(SplitConfig::default());
        assert!(splitter.split(&make_doc("")).is_empty());
    }

    #[test]
    fn short_document_is_one_passage() {
        let splitter = PassageSplitter::new(SplitConfig::default());
        let passages = splitter.split(&make_doc("Always use a clean cloth."));
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "Always use a clean cloth.");
        assert_eq!(passages[0].chunk_index, 0);
        assert_eq!(passages[0].source, "manual.txt");
    }

    #[test]
    fn long_text_splits_with_sequential_indices() {
        let text = "First rule here. Second rule here. Third rule here. Fourth rule here.";
        let splitter = PassageSplitter::new(SplitConfig {
            chunk_size: 40,
            chunk_overlap: 0,
        });
        let passages = splitter.split(&make_doc(text));
        assert!(passages.len() > 1);
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.chunk_index, i);
        }
    }

    #[test]
    fn overlap_repeats_trailing_sentence() {
        let text = "Aaaa bbbb cccc. Dddd eeee ffff. Gggg hhhh iiii.";
        let splitter = PassageSplitter::new(SplitConfig {
            chunk_size: 34,
            chunk_overlap: 16,
        });
        let passages = splitter.split(&make_doc(text));
        assert!(passages.len() >= 2);
        // The second passage starts with the last sentence of the first.
        let first_tail = passages[0].text.rsplit(". ").next().unwrap();
        assert!(passages[1].text.starts_with(first_tail.trim_end_matches('.')));
    }

    #[test]
    fn paragraph_breaks_split_units() {
        let units = sentence_units("First paragraph\n\nSecond paragraph");
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn terminators_split_units() {
        let units = sentence_units("Is it clean? Yes! Good.");
        assert_eq!(units.len(), 3);
    }

    #[test]
    fn no_terminator_is_single_unit() {
        let units = sentence_units("no punctuation at all");
        assert_eq!(units, vec!["no punctuation at all"]);
    }

    #[test]
    fn decimal_point_does_not_split() {
        let units = sentence_units("Pour 2.5 ounces per glass.");
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn giant_unbroken_unit_is_hard_cut() {
        let text = "x".repeat(95);
        let splitter = PassageSplitter::new(SplitConfig {
            chunk_size: 30,
            chunk_overlap: 5,
        });
        let passages = splitter.split(&make_doc(&text));
        assert_eq!(passages.len(), 4);
        assert!(passages.iter().all(|p| p.text.chars().count() <= 30));
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,3000}",
                chunk_size in 1usize..1000,
                chunk_overlap in 0usize..300,
            ) {
                let splitter = PassageSplitter::new(SplitConfig { chunk_size, chunk_overlap });
                let _ = splitter.split(&make_doc(&content));
            }

            #[test]
            fn no_empty_passages(
                content in "[a-z.!? ]{0,500}",
                chunk_size in 1usize..100,
            ) {
                let splitter = PassageSplitter::new(SplitConfig { chunk_size, chunk_overlap: 0 });
                for passage in splitter.split(&make_doc(&content)) {
                    prop_assert!(!passage.text.is_empty());
                }
            }

            #[test]
            fn indices_sequential(
                content in "[a-z. ]{0,800}",
                chunk_size in 5usize..120,
                chunk_overlap in 0usize..40,
            ) {
                let splitter = PassageSplitter::new(SplitConfig { chunk_size, chunk_overlap });
                for (i, passage) in splitter.split(&make_doc(&content)).iter().enumerate() {
                    prop_assert_eq!(passage.chunk_index, i);
                }
            }
        }
    }
}
