use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-•*]|\d+\.|[a-zA-Z]\))\s+").unwrap());
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:[.!?])\s+").unwrap());

/// Splits long listing descriptions into overlapping chunks for parallel
/// claim extraction. Split preference: blank lines, then list items, then
/// sentence boundaries.
pub struct DocumentChunker {
    max_chunk_size: usize,
    overlap: usize,
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self { max_chunk_size: 800, overlap: 50 }
    }
}

impl DocumentChunker {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self { max_chunk_size, overlap }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            tracing::warn!(target: "chunker", "empty document provided to chunker");
            return Vec::new();
        }

        let sections = self.split_into_sections(text);
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for section in sections {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }

            let candidate = if current.is_empty() {
                section.to_string()
            } else {
                format!("{}\n\n{}", current, section)
            };

            if candidate.len() <= self.max_chunk_size {
                current = candidate;
            } else if !current.is_empty() {
                let overlap_text = self.tail_overlap(&current);
                chunks.push(std::mem::take(&mut current));
                current = if overlap_text.is_empty() {
                    section.to_string()
                } else {
                    format!("{}{}", overlap_text, section)
                };
            } else if section.len() > self.max_chunk_size {
                let mut sub_chunks = self.split_large_section(section);
                if let Some(last) = sub_chunks.pop() {
                    chunks.extend(sub_chunks);
                    current = last;
                }
            } else {
                current = section.to_string();
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        tracing::debug!(target: "chunker", chunks = chunks.len(), chars = text.len(), "chunked document");
        chunks
    }

    fn split_into_sections(&self, text: &str) -> Vec<String> {
        let mut refined = Vec::new();
        for section in BLANK_LINES.split(text) {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }
            if self.has_list_items(section) {
                refined.extend(self.split_list_items(section));
            } else {
                refined.push(section.to_string());
            }
        }
        refined
    }

    fn has_list_items(&self, text: &str) -> bool {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() < 2 {
            return false;
        }
        lines.iter().filter(|line| LIST_ITEM.is_match(line)).count() >= 2
    }

    fn split_list_items(&self, text: &str) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.lines() {
            if LIST_ITEM.is_match(line) {
                if !current.is_empty() {
                    chunks.push(current.join("\n"));
                    current.clear();
                }
                current.push(line);
            } else if !line.trim().is_empty() {
                if current.is_empty() {
                    chunks.push(line.to_string());
                } else {
                    current.push(line);
                }
            }
        }
        if !current.is_empty() {
            chunks.push(current.join("\n"));
        }
        chunks
    }

    fn split_large_section(&self, section: &str) -> Vec<String> {
        let sentences = split_sentences(section);
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            let candidate = if current.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", current, sentence)
            };

            if candidate.len() <= self.max_chunk_size {
                current = candidate;
            } else if !current.is_empty() {
                let overlap_text = self.tail_overlap(&current);
                chunks.push(std::mem::take(&mut current));
                current = if overlap_text.is_empty() {
                    sentence.to_string()
                } else {
                    format!("{}{}", overlap_text, sentence)
                };
            } else {
                chunks.push(sentence.to_string());
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    // Last whole sentences of `text` that fit in the overlap budget, so a
    // chunk boundary never strands a half-stated fact.
    fn tail_overlap(&self, text: &str) -> String {
        if text.len() <= self.overlap {
            return text.to_string();
        }

        let sentences = split_sentences(text);
        let mut overlap = String::new();
        for sentence in sentences.iter().rev() {
            let candidate = if overlap.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", sentence, overlap)
            };
            if candidate.len() <= self.overlap {
                overlap = candidate;
            } else {
                break;
            }
        }

        if overlap.is_empty() {
            let start = text.len() - self.overlap;
            // Back off to a char boundary when the cut lands inside one
            let mut idx = start;
            while !text.is_char_boundary(idx) {
                idx += 1;
            }
            text[idx..].to_string()
        } else {
            overlap
        }
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(text) {
        // Keep the punctuation, drop the trailing whitespace
        let end = m.start() + 1;
        let sentence = text[last..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = m.end();
    }
    let rest = text[last..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}
