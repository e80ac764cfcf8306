use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Minimal non-overlapping cover of the input ranges, sorted by start.
pub fn merge_ranges(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    if ranges.is_empty() {
        return Vec::new();
    }
    ranges.sort_by_key(|range| range.start);

    let mut merged = Vec::new();
    let mut current = ranges[0];
    for next in ranges.into_iter().skip(1) {
        if next.start < current.end {
            if next.end > current.end {
                current.end = next.end;
            }
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

/// Sub-ranges of `window` not covered by `busy`. `busy` must already be
/// merged and ordered by start; the cursor only ever moves forward.
pub fn subtract_ranges(window: TimeRange, busy: &[TimeRange]) -> Vec<TimeRange> {
    let mut free = Vec::new();
    let mut cursor = window.start;
    for range in busy {
        if range.start > cursor {
            free.push(TimeRange::new(cursor, range.start));
        }
        if range.end > cursor {
            cursor = range.end;
        }
        if cursor > window.end {
            break;
        }
    }
    if cursor < window.end {
        free.push(TimeRange::new(cursor, window.end));
    }
    free
}
