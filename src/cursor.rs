//! Scan-window planning over a sync cursor.

use std::fmt;

/// Inclusive block range processed by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl ScanWindow {
    pub fn block_count(&self) -> u64 {
        self.to_block - self.from_block + 1
    }

    /// Splits the window into consecutive chunks no wider than `width`.
    pub fn chunks(&self, width: u64) -> impl Iterator<Item = ScanWindow> + use<> {
        let width = width.max(1);
        let to_block = self.to_block;
        let mut next = Some(self.from_block);
        std::iter::from_fn(move || {
            let from = next?;
            let to = from.saturating_add(width - 1).min(to_block);
            next = if to >= to_block { None } else { Some(to + 1) };
            Some(ScanWindow {
                from_block: from,
                to_block: to,
            })
        })
    }
}

impl fmt::Display for ScanWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from_block, self.to_block)
    }
}

/// Next window after `cursor` (last processed block), or `None` when the head has
/// not moved past it. Wide backlogs are clamped to `max_width` blocks and drained
/// over several ticks.
pub fn plan_window(
    cursor: Option<u64>,
    genesis_block: u64,
    head: u64,
    max_width: u64,
) -> Option<ScanWindow> {
    let from_block = match cursor {
        Some(last) => last.checked_add(1)?,
        None => genesis_block,
    };
    if head < from_block {
        return None;
    }

    let max_width = max_width.max(1);
    let to_block = if head - from_block >= max_width {
        from_block + max_width - 1
    } else {
        head
    };

    Some(ScanWindow {
        from_block,
        to_block,
    })
}
