//! Context Budget
//!
//! Measures text against the generation service's input limit and splits
//! oversized inputs. Sizes are expressed in budget units, a character-based
//! approximation of model tokens (one unit per four characters, rounded up).
//! Windows and overlaps are cut on character boundaries so chunking never
//! splits a UTF-8 code point.

use serde::{Deserialize, Serialize};

/// Characters per budget unit
pub const CHARS_PER_UNIT: usize = 4;

/// Separator placed between items grouped into one chunk
pub const DISCRETE_SEPARATOR: &str = "; ";

/// Appended to an item that had to be cut to fit a chunk on its own
pub const CONTINUATION_MARKER: &str = " [...truncated: continues beyond the context budget]";

/// Largest fold chunk, as a fraction of the limit
pub const MAX_CHUNK_RATIO: f64 = 2.0 / 3.0;

/// Budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard input limit of the generation service, in units
    #[serde(default = "default_max_units")]
    pub max_units: usize,

    /// Fold chunk size as a fraction of `max_units`
    #[serde(default = "default_chunk_ratio")]
    pub chunk_ratio: f64,

    /// Window overlap as a fraction of the chunk size
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f64,
}

fn default_max_units() -> usize {
    8192
}

fn default_chunk_ratio() -> f64 {
    0.5
}

fn default_overlap_ratio() -> f64 {
    0.1
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_units: default_max_units(),
            chunk_ratio: default_chunk_ratio(),
            overlap_ratio: default_overlap_ratio(),
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_units == 0 {
            return Err("max_units must be greater than zero".to_string());
        }
        // A merged tail window grows to 1.5 chunks and must still fit the limit
        if !(self.chunk_ratio > 0.0 && self.chunk_ratio <= MAX_CHUNK_RATIO) {
            return Err(format!(
                "chunk_ratio must be in (0, {:.3}], got {}",
                MAX_CHUNK_RATIO, self.chunk_ratio
            ));
        }
        if !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(format!(
                "overlap_ratio must be in [0, 1), got {}",
                self.overlap_ratio
            ));
        }
        Ok(())
    }
}

/// A group of whole items produced by [`ContextBudget::group_discrete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscreteChunk {
    pub items: Vec<String>,
    /// Set when the chunk is a single item cut down to the threshold
    pub truncated: bool,
}

impl DiscreteChunk {
    pub fn render(&self) -> String {
        self.items.join(DISCRETE_SEPARATOR)
    }
}

/// Size measurement and chunking against a fixed budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    max_units: usize,
    chunk_units: usize,
    overlap_units: usize,
}

impl ContextBudget {
    /// Budget with the default fold geometry: chunks of half the limit,
    /// overlapping by a tenth of a chunk.
    pub fn new(max_units: usize) -> Self {
        Self::from_config(&BudgetConfig {
            max_units,
            ..BudgetConfig::default()
        })
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        let chunk_units = (config.max_units as f64 * config.chunk_ratio) as usize;
        let overlap_units = (chunk_units as f64 * config.overlap_ratio) as usize;
        Self::with_units(config.max_units, chunk_units, overlap_units)
    }

    /// Explicit geometry. The chunk size is at least one unit and the overlap
    /// is kept strictly below it.
    pub fn with_units(max_units: usize, chunk_units: usize, overlap_units: usize) -> Self {
        let chunk_units = chunk_units.max(1);
        Self {
            max_units: max_units.max(1),
            chunk_units,
            overlap_units: overlap_units.min(chunk_units - 1),
        }
    }

    pub fn max_units(&self) -> usize {
        self.max_units
    }

    pub fn chunk_units(&self) -> usize {
        self.chunk_units
    }

    pub fn overlap_units(&self) -> usize {
        self.overlap_units
    }

    /// Size of `text` in budget units
    pub fn size(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_UNIT)
    }

    pub fn fits(&self, text: &str) -> bool {
        self.size(text) <= self.max_units
    }

    /// Split `text` into overlapping windows of `window` units, each starting
    /// `window - overlap` units after the previous one.
    ///
    /// Dropping the first `overlap` units of every chunk but the first and
    /// concatenating reconstructs `text`. A final window shorter than half a
    /// window is merged into its predecessor instead of standing alone.
    pub fn chunk_contiguous(&self, text: &str, window: usize, overlap: usize) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let window = window.max(1);
        let window_chars = window * CHARS_PER_UNIT;
        let overlap_chars = overlap.min(window - 1) * CHARS_PER_UNIT;
        let stride = window_chars - overlap_chars;

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        loop {
            if start + window_chars >= len {
                spans.push((start, len));
                break;
            }
            spans.push((start, start + window_chars));
            start += stride;

            if start + window_chars >= len && len - start < window_chars / 2 {
                if let Some(last) = spans.last_mut() {
                    last.1 = len;
                }
                break;
            }
        }

        spans
            .into_iter()
            .map(|(from, to)| chars[from..to].iter().collect())
            .collect()
    }

    /// Greedily pack whole items into chunks whose cumulative size, separators
    /// included, stays within `threshold` units. Items are never split; an
    /// item larger than the threshold becomes its own chunk, truncated so that
    /// it fits together with the continuation marker.
    pub fn group_discrete<S: AsRef<str>>(&self, items: &[S], threshold: usize) -> Vec<DiscreteChunk> {
        let separator_units = self.size(DISCRETE_SEPARATOR);
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_units = 0;

        for item in items {
            let item = item.as_ref();
            let units = self.size(item);

            if units > threshold {
                if !current.is_empty() {
                    chunks.push(DiscreteChunk {
                        items: std::mem::take(&mut current),
                        truncated: false,
                    });
                    current_units = 0;
                }
                chunks.push(DiscreteChunk {
                    items: vec![truncate_with_marker(item, self.truncation_units(threshold))],
                    truncated: true,
                });
                continue;
            }

            let cost = if current.is_empty() {
                units
            } else {
                units + separator_units
            };

            if current_units + cost > threshold {
                chunks.push(DiscreteChunk {
                    items: std::mem::take(&mut current),
                    truncated: false,
                });
                current.push(item.to_string());
                current_units = units;
            } else {
                current.push(item.to_string());
                current_units += cost;
            }
        }

        if !current.is_empty() {
            chunks.push(DiscreteChunk {
                items: current,
                truncated: false,
            });
        }

        chunks
    }

    /// Units of an oversized item kept ahead of the continuation marker.
    /// At least one unit survives even when the marker alone exceeds
    /// `threshold`.
    pub fn truncation_units(&self, threshold: usize) -> usize {
        threshold
            .saturating_sub(self.size(CONTINUATION_MARKER))
            .max(1)
    }
}

fn truncate_with_marker(text: &str, units: usize) -> String {
    let mut cut: String = text.chars().take(units * CHARS_PER_UNIT).collect();
    cut.push_str(CONTINUATION_MARKER);
    cut
}
