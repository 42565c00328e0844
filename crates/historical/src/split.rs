//! Task-local recovery from provider range-size errors.
//!
//! Providers reject oversized `eth_getLogs` ranges in two recoverable
//! shapes: a hint carrying the range that *would* work (Alchemy), and a
//! bare range-cap complaint. Both turn one failed task into smaller tasks
//! covering the same blocks.

use eventide_common::EthClientError;

/// How a failed range task should be re-enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SplitOutcome {
    /// Replace the task with these sub-ranges.
    Split(Vec<(u64, u64)>),
    /// Not a range error; retry with backoff.
    Retry,
}

/// Decides the recovery for a failed `[from, to]` range task.
pub(crate) fn split_ranges(error: &EthClientError, from: u64, to: u64) -> SplitOutcome {
    let Some(message) = error.provider_message() else {
        return SplitOutcome::Retry;
    };

    if let Some((_, suggested_hi)) = parse_suggested_range(message) {
        let hi = suggested_hi.clamp(from, to);
        let mut ranges = vec![(from, hi)];
        if hi < to {
            ranges.push((hi + 1, to));
        }
        return SplitOutcome::Split(ranges);
    }

    if is_range_cap_message(message) {
        if from == to {
            // cannot subdivide a single block; treat as transient
            return SplitOutcome::Retry;
        }
        let mid = from + (to - from) / 2;
        return SplitOutcome::Split(vec![(from, mid), (mid + 1, to)]);
    }

    SplitOutcome::Retry
}

/// Parses `"... this block range should work: [0xLo, 0xHi]"`.
fn parse_suggested_range(message: &str) -> Option<(u64, u64)> {
    let marker = "this block range should work: [";
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find(']')?;
    let mut parts = rest[..end].split(',');

    let lo = parse_hex(parts.next()?.trim())?;
    let hi = parse_hex(parts.next()?.trim())?;
    (parts.next().is_none() && lo <= hi).then_some((lo, hi))
}

fn parse_hex(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

/// Matches bare range-cap complaints across providers.
fn is_range_cap_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("block range less than")
        || lowered.contains("blocks range")
        || lowered.contains("block range is too wide")
        || lowered.contains("exceed maximum block range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alchemy_suggestion_splits_at_hint() {
        // failed [16369950, 16369952], hint [0xf9c91e, 0xf9c91f]
        let error = EthClientError::InvalidParams(
            "Log response size exceeded. this block range should work: [0xf9c91e, 0xf9c91f]"
                .to_owned(),
        );
        assert_eq!(
            split_ranges(&error, 16369950, 16369952),
            SplitOutcome::Split(vec![(16369950, 16369951), (16369952, 16369952)])
        );
    }

    #[test]
    fn test_suggestion_clamped_to_task_range() {
        let error = EthClientError::InvalidParams(
            "Log response size exceeded. this block range should work: [0x0, 0xffffffff]"
                .to_owned(),
        );
        assert_eq!(
            split_ranges(&error, 100, 200),
            SplitOutcome::Split(vec![(100, 200)])
        );
    }

    #[test]
    fn test_http_range_cap_bisects() {
        let error = EthClientError::Http {
            status: 400,
            message: "eth_getLogs and eth_newFilter are limited to a 10,000 blocks range"
                .to_owned(),
        };
        assert_eq!(
            split_ranges(&error, 16369950, 16369952),
            SplitOutcome::Split(vec![(16369950, 16369951), (16369952, 16369952)])
        );
    }

    #[test]
    fn test_rpc_range_cap_bisects() {
        let error = EthClientError::InvalidParams("block range less than 20000".to_owned());
        assert_eq!(
            split_ranges(&error, 0, 99),
            SplitOutcome::Split(vec![(0, 49), (50, 99)])
        );
    }

    #[test]
    fn test_single_block_range_cap_retries() {
        let error = EthClientError::InvalidParams("block range less than 20000".to_owned());
        assert_eq!(split_ranges(&error, 7, 7), SplitOutcome::Retry);
    }

    #[test]
    fn test_other_errors_retry() {
        assert_eq!(split_ranges(&EthClientError::RateLimited, 0, 10), SplitOutcome::Retry);
        assert_eq!(
            split_ranges(&EthClientError::network("reset"), 0, 10),
            SplitOutcome::Retry
        );
        // unrecognized provider text
        let error = EthClientError::InvalidParams("query returned too many results".to_owned());
        assert_eq!(split_ranges(&error, 0, 10), SplitOutcome::Retry);
    }
}
