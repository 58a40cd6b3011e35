//! Typed corpus schema and loaders.
//!
//! The corpora are read-only JSON files in `[data].corpus_dir`:
//!
//! | File | Shape |
//! |------|-------|
//! | `quran.json` | `{"chapters": [{number, name, verses: [{number, text}]}], "commentary": [{chapter, verse, text}]}` |
//! | `names.json` | `[{number, english, arabic, meaning, description}]` |
//! | `hadith.json` | `{"books": [{number, name, hadiths: [{number, narrator, english}]}]}` |
//!
//! Loading fails with [`CorpusError`] on unreadable files, shape mismatches,
//! or numbering that is not strictly increasing (the indexer's resume
//! cursors rely on it).

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quran {
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub commentary: Vec<Commentary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    pub name: String,
    pub verses: Vec<Verse>,
}

/// A verse. Number `0` marks an inserted Bismillah.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verse {
    pub number: u32,
    pub text: String,
}

/// A tafsir comment on one verse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commentary {
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Name {
    pub number: u32,
    pub english: String,
    pub arabic: String,
    pub meaning: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HadithCollection {
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub number: u32,
    pub name: String,
    pub hadiths: Vec<Hadith>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hadith {
    pub number: u32,
    #[serde(default)]
    pub narrator: String,
    pub english: String,
}

/// All three corpora, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub quran: Quran,
    pub names: Vec<Name>,
    pub hadith: HadithCollection,
}

impl Corpus {
    /// Load and validate `quran.json`, `names.json` and `hadith.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CorpusError> {
        let quran_path = dir.join("quran.json");
        let quran: Quran = read_json(&quran_path)?;
        validate_quran(&quran_path, &quran)?;

        let names: Vec<Name> = read_json(&dir.join("names.json"))?;

        let hadith_path = dir.join("hadith.json");
        let hadith: HadithCollection = read_json(&hadith_path)?;
        validate_hadith(&hadith_path, &hadith)?;

        tracing::info!(
            chapters = quran.chapters.len(),
            commentary = quran.commentary.len(),
            names = names.len(),
            books = hadith.books.len(),
            "corpus loaded from {}",
            dir.display()
        );

        Ok(Self {
            quran,
            names,
            hadith,
        })
    }

    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.quran.chapters.iter().find(|c| c.number == number)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CorpusError> {
    let bytes = std::fs::read(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CorpusError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path, reason: String) -> CorpusError {
    CorpusError::Invalid {
        path: PathBuf::from(path),
        reason,
    }
}

fn strictly_increasing(numbers: impl Iterator<Item = u32>) -> Option<(u32, u32)> {
    let mut prev: Option<u32> = None;
    for n in numbers {
        if let Some(p) = prev {
            if n <= p {
                return Some((p, n));
            }
        }
        prev = Some(n);
    }
    None
}

fn validate_quran(path: &Path, quran: &Quran) -> Result<(), CorpusError> {
    if let Some((p, n)) = strictly_increasing(quran.chapters.iter().map(|c| c.number)) {
        return Err(invalid(path, format!("chapter {} follows chapter {}", n, p)));
    }
    for chapter in &quran.chapters {
        if chapter.number == 0 {
            return Err(invalid(path, "chapter numbers start at 1".to_string()));
        }
        if let Some((p, n)) = strictly_increasing(chapter.verses.iter().map(|v| v.number)) {
            return Err(invalid(
                path,
                format!("chapter {}: verse {} follows verse {}", chapter.number, n, p),
            ));
        }
    }
    Ok(())
}

fn validate_hadith(path: &Path, hadith: &HadithCollection) -> Result<(), CorpusError> {
    for book in &hadith.books {
        if let Some((p, n)) = strictly_increasing(book.hadiths.iter().map(|h| h.number)) {
            return Err(invalid(
                path,
                format!("book {}: hadith {} follows hadith {}", book.number, n, p),
            ));
        }
    }
    Ok(())
}
