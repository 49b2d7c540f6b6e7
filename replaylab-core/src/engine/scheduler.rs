//! Chronological merge of per-subscription bar series.

use crate::domain::Bar;

/// All bars sharing the next global timestamp, in subscription order.
#[derive(Debug, Clone, PartialEq)]
pub struct BarGroup<'a> {
    pub timestamp_ms: i64,
    /// `(subscription index, bar)` pairs, ascending by index.
    pub bars: Vec<(usize, &'a Bar)>,
}

/// One read cursor per series. Each step scans every cursor for the minimum
/// next timestamp and advances all cursors sitting on it.
pub struct Scheduler<'a> {
    series: &'a [Vec<Bar>],
    cursors: Vec<usize>,
    end_ms: Option<i64>,
}

impl<'a> Scheduler<'a> {
    /// Bars before `start_ms` or after `end_ms` are never delivered.
    pub fn new(series: &'a [Vec<Bar>], start_ms: Option<i64>, end_ms: Option<i64>) -> Self {
        let cursors = series
            .iter()
            .map(|bars| match start_ms {
                Some(start) => bars.partition_point(|b| b.timestamp_ms < start),
                None => 0,
            })
            .collect();
        Self {
            series,
            cursors,
            end_ms,
        }
    }

    fn peek(&self, index: usize) -> Option<&'a Bar> {
        let bar = self.series[index].get(self.cursors[index])?;
        match self.end_ms {
            Some(end) if bar.timestamp_ms > end => None,
            _ => Some(bar),
        }
    }

    pub fn next_group(&mut self) -> Option<BarGroup<'a>> {
        let timestamp_ms = (0..self.series.len())
            .filter_map(|i| self.peek(i))
            .map(|b| b.timestamp_ms)
            .min()?;

        let mut bars = Vec::new();
        for i in 0..self.series.len() {
            if let Some(bar) = self.peek(i).filter(|b| b.timestamp_ms == timestamp_ms) {
                bars.push((i, bar));
                self.cursors[i] += 1;
            }
        }
        Some(BarGroup { timestamp_ms, bars })
    }
}

impl<'a> Iterator for Scheduler<'a> {
    type Item = BarGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group()
    }
}

/// Index of the first out-of-order bar in a series, if any.
pub fn first_unsorted(bars: &[Bar]) -> Option<usize> {
    bars.windows(2)
        .position(|w| w[1].timestamp_ms < w[0].timestamp_ms)
        .map(|i| i + 1)
}
