//! Daily verse / hadith / name rotation.
//!
//! [`DailyRotator::tick`] runs one Selecting → Validating → Publishing pass:
//! draw a triple through the [`Picker`], re-draw while the verse is rejected
//! (bounded by `max_redraws`), extend the verse to a full sentence, then
//! publish to the [`DailyBoard`]. The first publish of each calendar day is
//! also stored under its date and fanned out to push subscribers, gated by
//! a persisted last-push marker.
//!
//! [`DailyRotator::run`] repeats the tick on an interval until cancelled.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use reminder_core::rotation::{validate_verse, ContinuationPolicy, Picker};

use crate::corpus::Corpus;
use crate::hijri::HijriDate;
use crate::push::{send_to_all, Notification, Notifier, SubscriptionRegistry};

/// Key of the most recent publish in the daily index.
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersePick {
    pub chapter: u32,
    pub chapter_name: String,
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HadithPick {
    pub book: u32,
    pub book_name: String,
    pub number: u32,
    pub narrator: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamePick {
    pub number: u32,
    pub english: String,
    pub arabic: String,
    pub meaning: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyState {
    pub verse: VersePick,
    pub hadith: HadithPick,
    pub name: NamePick,
    pub links: BTreeMap<String, String>,
    pub updated: DateTime<Utc>,
    pub message: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub hijri: String,
}

/// Shared daily state: `date -> DailyState` plus [`LATEST`].
///
/// Handlers read under the read lock; only the rotator takes the write
/// lock. The whole map is rewritten to disk after each publish.
pub struct DailyBoard {
    path: Option<PathBuf>,
    index: RwLock<BTreeMap<String, DailyState>>,
}

impl DailyBoard {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the board persisted at `path`. A missing file is an empty board.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let index = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse daily index {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read daily index {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            index: RwLock::new(index),
        })
    }

    /// The latest publish, if any.
    pub async fn current(&self) -> Option<DailyState> {
        self.index.read().await.get(LATEST).cloned()
    }

    pub async fn by_date(&self, date: &str) -> Option<DailyState> {
        self.index.read().await.get(date).cloned()
    }

    /// Dates with a stored entry, oldest first.
    pub async fn dates(&self) -> Vec<String> {
        self.index
            .read()
            .await
            .keys()
            .filter(|k| k.as_str() != LATEST)
            .cloned()
            .collect()
    }

    /// Replace [`LATEST`] and, when `dated`, the entry for `state.date`.
    pub async fn publish(&self, state: DailyState, dated: bool) -> Result<()> {
        let bytes = {
            let mut index = self.index.write().await;
            if dated {
                index.insert(state.date.clone(), state.clone());
            }
            index.insert(LATEST.to_string(), state);
            serde_json::to_vec_pretty(&*index)?
        };

        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write daily index {}", path.display()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MarkerFile {
    date: String,
}

/// Persisted date of the last push fan-out.
#[derive(Debug, Clone)]
pub struct PushMarker {
    path: Option<PathBuf>,
}

impl PushMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn last(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice::<MarkerFile>(&bytes)
            .ok()
            .map(|m| m.date)
            .filter(|d| !d.is_empty())
    }

    pub fn mark(&self, date: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&MarkerFile {
            date: date.to_string(),
        })?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write push marker {}", path.display()))
    }
}

/// Result of one rotation tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub state: DailyState,
    /// Draws rejected before the published one.
    pub redraws: usize,
    /// This tick started a new day and fanned out a push.
    pub pushed: bool,
    pub push_errors: Vec<String>,
}

struct Selection {
    chapter: usize,
    verse: usize,
    book: usize,
    hadith: usize,
    name: usize,
}

pub struct DailyRotator {
    corpus: Arc<Corpus>,
    board: Arc<DailyBoard>,
    picker: Arc<dyn Picker>,
    policy: ContinuationPolicy,
    max_redraws: usize,
    marker: PushMarker,
    registry: Arc<SubscriptionRegistry>,
    notifier: Arc<dyn Notifier>,
    send_delay: Duration,
    /// Last push date seen by this process, in case the marker can't be written.
    last_pushed: Mutex<Option<String>>,
}

impl DailyRotator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        corpus: Arc<Corpus>,
        board: Arc<DailyBoard>,
        picker: Arc<dyn Picker>,
        policy: ContinuationPolicy,
        max_redraws: usize,
        marker: PushMarker,
        registry: Arc<SubscriptionRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            corpus,
            board,
            picker,
            policy,
            max_redraws,
            marker,
            registry,
            notifier,
            send_delay: Duration::from_millis(100),
            last_pushed: Mutex::new(None),
        }
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// One Selecting → Validating → Publishing pass at time `now`.
    ///
    /// Fails without touching the board when the corpus is empty or every
    /// allowed draw was rejected.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let (selection, redraws) = self.select()?;
        let state = self.compose(&selection, now);

        let new_day = self.last_pushed().as_deref() != Some(state.date.as_str());
        self.board.publish(state.clone(), new_day).await?;
        tracing::info!(
            chapter = state.verse.chapter,
            verse = state.verse.number,
            redraws,
            "published daily reminder"
        );

        let mut push_errors = Vec::new();
        if new_day {
            *self
                .last_pushed
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(state.date.clone());
            if let Err(e) = self.marker.mark(&state.date) {
                tracing::warn!("failed to record push date: {:#}", e);
            }
            let notification = Notification {
                title: "Daily Reminder".to_string(),
                body: state.message.clone(),
                url: "/".to_string(),
            };
            push_errors = send_to_all(
                &self.registry,
                self.notifier.as_ref(),
                &notification,
                self.send_delay,
            )
            .await;
        }

        Ok(TickReport {
            state,
            redraws,
            pushed: new_day,
            push_errors,
        })
    }

    /// The later of the persisted marker and the in-process record.
    fn last_pushed(&self) -> Option<String> {
        let seen = self
            .last_pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        seen.max(self.marker.last())
    }

    fn select(&self) -> Result<(Selection, usize)> {
        let chapters = &self.corpus.quran.chapters;
        let books = &self.corpus.hadith.books;
        let names = &self.corpus.names;
        if chapters.is_empty() || books.is_empty() || names.is_empty() {
            bail!("corpus is missing verses, hadith or names");
        }

        for attempt in 0..=self.max_redraws {
            let name = self.picker.pick(names.len());
            let book = self.picker.pick(books.len());
            let hadiths = &books[book].hadiths;
            if hadiths.is_empty() {
                continue;
            }
            let hadith = self.picker.pick(hadiths.len());
            let chapter = self.picker.pick(chapters.len());
            let verses = &chapters[chapter].verses;
            if verses.is_empty() {
                continue;
            }
            let verse = self.picker.pick(verses.len());

            let v = &verses[verse];
            if let Err(rejection) = validate_verse(v.number, &v.text) {
                tracing::debug!(
                    chapter = chapters[chapter].number,
                    verse = v.number,
                    ?rejection,
                    "verse rejected, drawing again"
                );
                continue;
            }
            return Ok((
                Selection {
                    chapter,
                    verse,
                    book,
                    hadith,
                    name,
                },
                attempt,
            ));
        }
        bail!(
            "no publishable verse after {} draws",
            self.max_redraws + 1
        )
    }

    fn compose(&self, s: &Selection, now: DateTime<Utc>) -> DailyState {
        let chapter = &self.corpus.quran.chapters[s.chapter];
        let verse = &chapter.verses[s.verse];
        let (text, _) = self.policy.extend(
            &verse.text,
            chapter.verses[s.verse + 1..].iter().map(|v| v.text.as_str()),
        );
        let book = &self.corpus.hadith.books[s.book];
        let hadith = &book.hadiths[s.hadith];
        let name = &self.corpus.names[s.name];

        let links = BTreeMap::from([
            (
                "verse".to_string(),
                format!("/quran/{}#{}", chapter.number, verse.number),
            ),
            (
                "hadith".to_string(),
                format!("/hadith/{}#{}", book.number, hadith.number),
            ),
            ("name".to_string(), format!("/names/{}", name.number)),
        ]);

        let today = now.date_naive();
        let date = today.format("%Y-%m-%d").to_string();
        let hijri = HijriDate::from_gregorian(today);
        let display = hijri.map(|h| h.display()).unwrap_or_else(|| date.clone());

        DailyState {
            verse: VersePick {
                chapter: chapter.number,
                chapter_name: chapter.name.clone(),
                number: verse.number,
                text,
            },
            hadith: HadithPick {
                book: book.number,
                book_name: book.name.clone(),
                number: hadith.number,
                narrator: hadith.narrator.clone(),
                text: hadith.english.clone(),
            },
            name: NamePick {
                number: name.number,
                english: name.english.clone(),
                arabic: name.arabic.clone(),
                meaning: name.meaning.clone(),
                description: name.description.clone(),
            },
            links,
            updated: now,
            message: format!("Salam, today is {}", display),
            date,
            hijri: hijri.map(|h| h.iso()).unwrap_or_default(),
        }
    }

    /// Tick immediately, then every `interval`, until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("daily rotation stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!("daily rotation failed: {:#}", e);
                    }
                }
            }
        }
    }
}
