use crate::models::Candle;
use std::collections::VecDeque;

/// Outcome of feeding one live candle into the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUpdate {
    /// Newer candle appended (oldest evicted if the window was full)
    Appended,
    /// Partial update of the latest candle, replaced in place
    Replaced,
    /// Older than the last known candle, dropped
    Ignored,
}

/// Rolling window of the most recent candles for one instrument
///
/// Open times are strictly increasing and the length never exceeds the
/// configured capacity.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create an empty buffer
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_candles),
            max_candles,
        }
    }

    /// Seed from a bulk history fetch (oldest first)
    ///
    /// Replaces any existing content. Entries that do not advance the open
    /// time are dropped and only the newest `max_candles` are kept.
    pub fn initialize(&mut self, history: Vec<Candle>) {
        self.candles.clear();
        for candle in history {
            if let Some(last) = self.candles.back_mut() {
                if candle.open_time == last.open_time {
                    *last = candle;
                    continue;
                }
                if candle.open_time < last.open_time {
                    continue;
                }
            }
            self.candles.push_back(candle);
            if self.candles.len() > self.max_candles {
                self.candles.pop_front();
            }
        }
    }

    /// Apply one live candle event
    pub fn apply_update(&mut self, candle: Candle) -> BufferUpdate {
        match self.candles.back_mut() {
            Some(last) if candle.open_time == last.open_time => {
                *last = candle;
                BufferUpdate::Replaced
            }
            Some(last) if candle.open_time < last.open_time => BufferUpdate::Ignored,
            _ => {
                if self.max_candles == 0 {
                    return BufferUpdate::Ignored;
                }
                if self.candles.len() == self.max_candles {
                    self.candles.pop_front();
                }
                self.candles.push_back(candle);
                BufferUpdate::Appended
            }
        }
    }

    /// Window contents, oldest first
    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Open time of the newest candle, if any
    pub fn last_open_time(&self) -> Option<i64> {
        self.candles.back().map(|c| c.open_time)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_candles
    }
}
