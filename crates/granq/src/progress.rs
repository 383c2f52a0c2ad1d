//! 📊 progress.rs: "Are we there yet?" (every pipeline, every time, forever)
//!
//! 🚀 Answers the age-old question "how many granules went out?" with cold hard numbers,
//! a progress bar, and a table so comfy it has lumbar support.
//!
//! Two displays:
//! - while running: a bar over granules queued, with a small rates table as its message
//! - afterwards: [`summary_table`], one row per group (collection, provider, batches, granules)
//!
//! [`QueueProgress`] is cheap to clone: the bar is reference counted by indicatif and the
//! counters live behind an `Arc`, so the supervisor and the caller watch the same run.
//!
//! ⚠️ Watching this progress bar will not make it go faster. We've tried. Science says no.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::Mutex;

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls. If it shows HH, call your mom.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 🧾 One finished group, as it will appear in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTally {
    pub collection_id: String,
    pub provider: String,
    pub batches: usize,
    pub granules: usize,
}

#[derive(Debug, Default)]
struct Counters {
    granules: AtomicU64,
    batches: AtomicU64,
    groups: AtomicU64,
}

/// 📊 Live progress of one queue run.
#[derive(Clone)]
pub struct QueueProgress {
    progress_bar: ProgressBar,
    total_granules: u64,
    start_time: Instant,
    counters: Arc<Counters>,
    tallies: Arc<Mutex<Vec<GroupTally>>>,
}

impl std::fmt::Debug for QueueProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't do Debug
        f.debug_struct("QueueProgress")
            .field("total_granules", &self.total_granules)
            .field("counters", &self.counters)
            .finish()
    }
}

impl QueueProgress {
    /// 🚀 A visible bar (on stderr) over `total_granules`.
    pub fn new(total_granules: u64) -> Self {
        let progress_bar = ProgressBar::new(total_granules);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self::with_bar(progress_bar, total_granules)
    }

    /// 🙈 Same bookkeeping, nothing drawn. Tests and library callers live here.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden(), 0)
    }

    fn with_bar(progress_bar: ProgressBar, total_granules: u64) -> Self {
        Self {
            progress_bar,
            total_granules,
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            tallies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 📬 A batch of `granules` was dispatched.
    pub fn batch_dispatched(&self, granules: usize) {
        let granules = granules as u64;
        let queued = self.counters.granules.fetch_add(granules, Ordering::SeqCst) + granules;
        self.counters.batches.fetch_add(1, Ordering::SeqCst);
        self.progress_bar.set_position(queued);
        self.render();
    }

    /// 🧾 A whole group made it out. Groups finish one at a time, in order.
    pub async fn group_finished(&self, tally: GroupTally) {
        self.counters.groups.fetch_add(1, Ordering::SeqCst);
        self.tallies.lock().await.push(tally);
        self.render();
    }

    /// 🧾 Every finished group so far, in the order they finished.
    pub async fn tallies(&self) -> Vec<GroupTally> {
        self.tallies.lock().await.clone()
    }

    pub fn granules_queued(&self) -> u64 {
        self.counters.granules.load(Ordering::SeqCst)
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.counters.batches.load(Ordering::SeqCst)
    }

    /// ✅ Ring the bell. We made it.
    pub fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 🎨 Redraw the rates table as the bar's message.
    ///
    /// ```text
    ///   <granules/s>   <queued / total>
    ///   <batches>      <groups>
    ///   <elapsed>      <remaining>
    /// ```
    fn render(&self) {
        if self.progress_bar.is_hidden() {
            return;
        }
        let queued = self.granules_queued();
        let elapsed = self.start_time.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            queued as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let remaining = if rate > 0.0 && self.total_granules > queued {
            // 🔮 linear extrapolation: assumes the future looks like the past
            format_duration(Duration::from_secs_f64((self.total_granules - queued) as f64 / rate))
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Granules/s", format_number(rate as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Granules",
                format_number(queued),
                format_number(self.total_granules)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} Batches", format_number(self.batches_dispatched())))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} Groups",
                format_number(self.counters.groups.load(Ordering::SeqCst))
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar.set_message(format!("granq: queueing\n{}", table));
    }
}

/// 🍽️ The end-of-run table: one row per group, plus a totals row.
pub fn summary_table(tallies: &[GroupTally]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["collection", "provider", "batches", "granules"]);
    for tally in tallies {
        table.add_row(vec![
            Cell::new(&tally.collection_id),
            Cell::new(&tally.provider),
            Cell::new(format_number(tally.batches as u64)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(tally.granules as u64)).set_alignment(CellAlignment::Right),
        ]);
    }
    let batches: usize = tallies.iter().map(|t| t.batches).sum();
    let granules: usize = tallies.iter().map(|t| t.granules).sum();
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(""),
        Cell::new(format_number(batches as u64)).set_alignment(CellAlignment::Right),
        Cell::new(format_number(granules as u64)).set_alignment(CellAlignment::Right),
    ]);
    table
}
