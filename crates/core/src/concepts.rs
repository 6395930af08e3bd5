//! Concept library, ad hoc extra concepts, and the user's selections.

use hashbrown::HashSet;

/// Concepts from the library text: one per line, trimmed, blanks dropped.
pub fn parse_library(text: &str) -> Vec<String> {
    split_trimmed(text, '\n')
}

/// Concepts from the extra-concepts field: comma separated.
pub fn parse_extra(text: &str) -> Vec<String> {
    split_trimmed(text, ',')
}

fn split_trimmed(text: &str, sep: char) -> Vec<String> {
    text.split(sep)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// De-duplicated union of library and extra concepts (case-sensitive, first-seen order).
pub fn available_concepts(library_text: &str, extra_text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    parse_library(library_text)
        .into_iter()
        .chain(parse_extra(extra_text))
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptSet {
    library_text: String,
    extra_text: String,
    available: Vec<String>,
    selected: Vec<String>,
    biases: Vec<String>,
}

impl ConceptSet {
    pub fn library_text(&self) -> &str {
        &self.library_text
    }

    pub fn extra_text(&self) -> &str {
        &self.extra_text
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn biases(&self) -> &[String] {
        &self.biases
    }

    pub fn is_selected(&self, concept: &str) -> bool {
        self.selected.iter().any(|c| c == concept)
    }

    /// Library contents in the shape the backend stores them.
    pub fn library_concepts(&self) -> Vec<String> {
        parse_library(&self.library_text)
    }

    pub fn set_library_text(&mut self, text: impl Into<String>) {
        self.library_text = text.into();
        self.recompute();
    }

    pub fn set_extra_text(&mut self, text: impl Into<String>) {
        self.extra_text = text.into();
        self.recompute();
    }

    /// A library fetched from the backend replaces the text and becomes the selection.
    pub fn load_library(&mut self, concepts: Vec<String>) {
        self.library_text = concepts.join("\n");
        self.selected = concepts;
        self.recompute();
    }

    pub fn toggle(&mut self, concept: &str) {
        if let Some(pos) = self.selected.iter().position(|c| c == concept) {
            self.selected.remove(pos);
        } else {
            self.selected.push(concept.to_string());
        }
    }

    /// Bias concepts are chosen among the current selection; duplicates and
    /// unselected entries are ignored.
    pub fn set_biases(&mut self, biases: Vec<String>) {
        let mut seen: HashSet<String> = HashSet::new();
        self.biases = biases
            .into_iter()
            .filter(|b| self.is_selected(b))
            .filter(|b| seen.insert(b.clone()))
            .collect();
    }

    /// Selected concepts that are no longer available. They are kept and still
    /// sent with the next analysis.
    pub fn stale_selections(&self) -> Vec<&str> {
        self.selected
            .iter()
            .filter(|c| !self.available.contains(c))
            .map(String::as_str)
            .collect()
    }

    fn recompute(&mut self) {
        self.available = available_concepts(&self.library_text, &self.extra_text);
    }
}
