//! Search queries and their dataset directory names

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};

/// Characters that are not valid inside a path segment on common filesystems
const INVALID_SEGMENT_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Built-in car list used when no queries are configured
///
/// Entries with a second element carry an explicit directory name.
pub const DEFAULT_QUERIES: &[(&str, Option<&str>)] = &[
    ("2023 Aston Martin Vantage", None),
    ("2025 Aston Martin Vanquish", None),
    ("Aston Martin Valhala", None),
    ("Aston Martin Valkyrie", None),
    ("Aston Martin Vulcan", None),
    ("Aventador SVJ", None),
    ("BMW i8", None),
    ("Bugatti Bolide", None),
    ("Bugatti Chiron", None),
    ("Bugatti Chiron SS", None),
    ("Bugatti Veyron", None),
    ("Ferrari 296 GTB", None),
    ("Ferrari 458 SPECIALE", None),
    ("Ferrari 812 Superfast", None),
    ("Ferrari Daytona", None),
    ("Ferrari F8", None),
    ("Ferrari LaFerrari", None),
    ("Ferrari Monza SP2", None),
    ("Ferrari Portofino", None),
    ("Ferrari Roma", None),
    ("Ferrari SF90", None),
    ("Hennessey Venom F5", None),
    ("Koenigsegg Agera", None),
    ("Koenigsegg Jesko", None),
    ("Koenigsegg One:1", Some("Koenigsegg One_1")),
    ("Koenigsegg Regera", None),
    ("Lamborghini Gallardo", None),
    ("Lamborghini Huracan", None),
    ("Lamborghini Murciélago", Some("Lamborghini Murcielago")),
    ("Lamborghini Revuelto", None),
    ("Lamborghini Sesto Elemento", None),
    ("Lotus Evija", None),
    ("McLaren F1", None),
    ("McLaren P1", None),
    ("McLaren Senna", None),
    ("Mclaren Solus GT", None),
    ("McLaren Speedtail", None),
    ("Mercedes-AMG Project One", None),
    ("Pagani Huayra", None),
    ("Pininfarina Battista", None),
    ("Porsche 911", None),
    ("Porsche 918 Spyder", None),
    ("Porsche GT3RS", None),
    ("Porsche GT4RS", None),
    ("Porsche Taycan", None),
    ("Rimac Concept One", None),
    ("Rimac Nevera", None),
    ("SSC Tuatara", None),
    ("W Motors Lykan HyperSport", None),
    ("Zenvo ST1", None),
];

/// A search term and the directory its images are stored in
///
/// In JSON a query is either a plain string or a `[query, directory]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "QueryRepr", into = "QueryRepr")]
pub struct Query {
    text: String,
    directory: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum QueryRepr {
    Plain(String),
    Named(String, String),
}

impl From<QueryRepr> for Query {
    fn from(repr: QueryRepr) -> Self {
        match repr {
            QueryRepr::Plain(text) => Self::new(text),
            QueryRepr::Named(text, directory) => Self::with_directory(text, directory),
        }
    }
}

impl From<Query> for QueryRepr {
    fn from(query: Query) -> Self {
        match query.directory {
            Some(directory) => Self::Named(query.text, directory),
            None => Self::Plain(query.text),
        }
    }
}

impl Query {
    /// Query whose directory name is derived from the search text
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            directory: None,
        }
    }

    /// Query with an explicit directory name, used verbatim
    pub fn with_directory<S: Into<String>, D: Into<String>>(text: S, directory: D) -> Self {
        Self {
            text: text.into(),
            directory: Some(directory.into()),
        }
    }

    /// The built-in car list
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        DEFAULT_QUERIES
            .iter()
            .map(|&(text, directory)| match directory {
                Some(directory) => Self::with_directory(text, directory),
                None => Self::new(text),
            })
            .collect()
    }

    /// Search text sent to the results page
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Directory name under the dataset root
    #[must_use]
    pub fn directory_name(&self) -> String {
        match &self.directory {
            Some(directory) => directory.clone(),
            None => sanitize_segment(&self.text),
        }
    }

    /// Check that the directory name is a single, safe path segment
    ///
    /// # Errors
    /// - Empty name, `.` or `..`
    /// - Name containing a separator, a reserved character or a control character
    pub fn validate(&self) -> Result<()> {
        let name = self.directory_name();
        if name.is_empty() || name == "." || name == ".." {
            return Err(DatasetError::invalid_config(format!(
                "Query '{}' has no usable directory name",
                self.text
            )));
        }

        if let Some(bad) = name.chars().find(|&c| is_invalid_segment_char(c)) {
            return Err(DatasetError::invalid_config(format!(
                "Directory name '{}' for query '{}' contains invalid character {:?}",
                name, self.text, bad
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_invalid_segment_char(c: char) -> bool {
    c.is_control() || INVALID_SEGMENT_CHARS.contains(&c)
}

/// Replace characters that are invalid in a path segment with `_`
///
/// Trailing dots and spaces are trimmed since some filesystems drop them.
#[must_use]
pub fn sanitize_segment(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if is_invalid_segment_char(c) { '_' } else { c })
        .collect();
    replaced.trim_end_matches(['.', ' ']).to_string()
}
