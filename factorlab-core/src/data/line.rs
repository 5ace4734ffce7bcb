//! The `Line`: a time-aligned series with a movable causal read cursor.
//!
//! Every series in a run (the main clock, each OHLC column, every derived
//! signal) is a `Line` over the same global index. Offset 0 reads the value
//! at the cursor, negative offsets read history, and positive offsets are
//! never served: values past the cursor do not exist yet as far as any
//! consumer is concerned.

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line exhausted: cursor already at the last position ({len} values)")]
    Exhausted { len: usize },

    #[error("cursor {cursor} out of range for line of length {len}")]
    CursorOutOfRange { cursor: usize, len: usize },
}

/// A cursor-synchronized series.
///
/// The cursor only ever moves forward, one step per call to [`advance`].
///
/// [`advance`]: Line::advance
#[derive(Debug, Clone, PartialEq)]
pub struct Line<T> {
    values: Vec<T>,
    cursor: usize,
}

impl<T: Copy> Line<T> {
    /// A line with the cursor at position 0.
    pub fn new(values: Vec<T>) -> Self {
        Self { values, cursor: 0 }
    }

    /// A line with the cursor pre-positioned (warmup history behind it).
    pub fn with_cursor(values: Vec<T>, cursor: usize) -> Result<Self, LineError> {
        let len = values.len();
        if len == 0 || cursor >= len {
            return Err(LineError::CursorOutOfRange { cursor, len });
        }
        Ok(Self { values, cursor })
    }

    /// Read the value at `cursor + offset`.
    ///
    /// Returns `None` for offsets before the start of history and for any
    /// positive offset (the causality boundary).
    pub fn get(&self, offset: isize) -> Option<T> {
        if offset > 0 {
            return None;
        }
        let back = offset.unsigned_abs();
        if back > self.cursor {
            return None;
        }
        Some(self.values[self.cursor - back])
    }

    /// Move the cursor forward exactly one step.
    pub fn advance(&mut self) -> Result<(), LineError> {
        if self.at_end() {
            return Err(LineError::Exhausted {
                len: self.values.len(),
            });
        }
        self.cursor += 1;
        Ok(())
    }

    /// Reposition the cursor when attaching a freshly computed line to an
    /// already-advanced frame. Crate-internal: consumers only ever see the
    /// cursor move forward.
    pub(crate) fn seek(&mut self, cursor: usize) -> Result<(), LineError> {
        if cursor >= self.values.len() {
            return Err(LineError::CursorOutOfRange {
                cursor,
                len: self.values.len(),
            });
        }
        self.cursor = cursor;
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the cursor sits on the final position.
    pub fn at_end(&self) -> bool {
        self.cursor + 1 >= self.values.len()
    }

    /// The full backing array. Construction-time use only; per-tick reads go
    /// through [`get`](Line::get) so that the cursor is respected.
    pub fn values(&self) -> &[T] {
        &self.values
    }
}
