//! Channel-range shorthand.
//!
//! A channel range is a comma separated list of tokens, each either a single
//! channel number or an inclusive `start-end` span:
//!
//! ```
//! use rulegrid_core::ChannelRangeParser;
//!
//! let parser = ChannelRangeParser::new(64);
//! let channels = parser.parse("1-3,5,8-10").unwrap();
//! assert_eq!(channels, vec![1, 2, 3, 5, 8, 9, 10]);
//! assert_eq!(ChannelRangeParser::serialize(&channels), "1-3,5,8-10");
//! ```
//!
//! Channelled interfaces reserve the netclass name prefixes `<interface><channel>`
//! for generated netclasses, so user-entered names must not start with any of them.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{ChannelConfig, Result, RuleGridError};

pub const DEFAULT_MAX_CHANNEL_COUNT: u32 = 128;
/// Upper bound accepted for a configured channel count; parsing materializes every channel.
pub const CHANNEL_COUNT_LIMIT: u32 = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRangeParser {
    max_channel_count: u32,
}

impl Default for ChannelRangeParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHANNEL_COUNT)
    }
}

impl ChannelRangeParser {
    pub fn new(max_channel_count: u32) -> Self {
        Self { max_channel_count }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(config.max_channel_count)
    }

    pub fn max_channel_count(&self) -> u32 {
        self.max_channel_count
    }

    /// Parse shorthand into a sorted, deduplicated channel list.
    ///
    /// Blank input yields an empty list (an unchannelled interface).
    pub fn parse(&self, text: &str) -> Result<Vec<u32>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut channels = BTreeSet::new();
        for raw in text.split(',') {
            let token = raw.trim();
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = self.parse_number(start.trim(), token)?;
                    let end = self.parse_number(end.trim(), token)?;
                    if start > end {
                        return Err(RuleGridError::InvertedRange { start, end });
                    }
                    channels.extend(start..=end);
                }
                None => {
                    channels.insert(self.parse_number(token, token)?);
                }
            }
        }

        debug!("Parsed channel range '{}' into {} channels", text, channels.len());
        Ok(channels.into_iter().collect())
    }

    fn parse_number(&self, digits: &str, token: &str) -> Result<u32> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RuleGridError::MalformedRange {
                token: token.to_string(),
            });
        }
        // All-digit input only fails to parse on overflow.
        let value = digits.parse::<u64>().unwrap_or(u64::MAX);
        if value == 0 || value > u64::from(self.max_channel_count) {
            return Err(RuleGridError::OutOfBounds {
                value,
                max: self.max_channel_count,
            });
        }
        Ok(value as u32)
    }

    /// Canonical shorthand: ascending runs of two or more collapse into `start-end`.
    pub fn serialize(numbers: &[u32]) -> String {
        let mut sorted = numbers.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut parts = Vec::new();
        let mut iter = sorted.into_iter().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(&next) = iter.peek() {
                if end.checked_add(1) != Some(next) {
                    break;
                }
                end = next;
                iter.next();
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{}-{}", start, end));
            }
        }
        parts.join(",")
    }

    pub fn reserved_prefix(interface_name: &str, channel: u32) -> String {
        format!("{}{}", interface_name, channel)
    }

    /// The reserved prefix `candidate` starts with, compared case-insensitively.
    pub fn colliding_prefix(
        candidate: &str,
        interface_name: &str,
        channels: &[u32],
    ) -> Option<String> {
        let candidate = candidate.trim().to_lowercase();
        channels
            .iter()
            .map(|&ch| Self::reserved_prefix(interface_name, ch))
            .find(|prefix| candidate.starts_with(&prefix.to_lowercase()))
    }

    pub fn is_reserved_name_collision(
        candidate: &str,
        interface_name: &str,
        channels: &[u32],
    ) -> bool {
        Self::colliding_prefix(candidate, interface_name, channels).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_tokens() {
        let parser = ChannelRangeParser::default();
        assert_eq!(
            parser.parse("1-3,5,8-10").unwrap(),
            vec![1, 2, 3, 5, 8, 9, 10]
        );
    }

    #[test]
    fn parse_sorts_and_dedups() {
        let parser = ChannelRangeParser::default();
        assert_eq!(parser.parse(" 7, 2-4 ,3,7 ").unwrap(), vec![2, 3, 4, 7]);
    }

    #[test]
    fn blank_input_is_empty() {
        let parser = ChannelRangeParser::default();
        assert!(parser.parse("   ").unwrap().is_empty());
    }

    #[test]
    fn rejects_inverted_range() {
        let parser = ChannelRangeParser::default();
        assert!(matches!(
            parser.parse("5-2"),
            Err(RuleGridError::InvertedRange { start: 5, end: 2 })
        ));
    }

    #[test]
    fn rejects_malformed_tokens() {
        let parser = ChannelRangeParser::default();
        for input in ["abc", "1,,2", "-3", "1-2-3", "4-", "+5", "1.5"] {
            assert!(
                matches!(parser.parse(input), Err(RuleGridError::MalformedRange { .. })),
                "expected malformed for {input:?}"
            );
        }
    }

    #[test]
    fn rejects_out_of_bounds() {
        let parser = ChannelRangeParser::new(16);
        assert!(matches!(
            parser.parse("10-17"),
            Err(RuleGridError::OutOfBounds { value: 17, max: 16 })
        ));
        assert!(matches!(
            parser.parse("0"),
            Err(RuleGridError::OutOfBounds { value: 0, .. })
        ));
        assert!(matches!(
            parser.parse("99999999999999999999999"),
            Err(RuleGridError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn serializes_canonically() {
        assert_eq!(
            ChannelRangeParser::serialize(&[1, 2, 3, 5, 8, 9, 10]),
            "1-3,5,8-10"
        );
        assert_eq!(ChannelRangeParser::serialize(&[4, 1, 2, 2]), "1-2,4");
        assert_eq!(ChannelRangeParser::serialize(&[]), "");
    }

    #[test]
    fn serializes_up_to_u32_max() {
        let top = u32::MAX;
        assert_eq!(
            ChannelRangeParser::serialize(&[top - 1, top, 1]),
            format!("1,{}-{}", top - 1, top)
        );
        assert_eq!(ChannelRangeParser::serialize(&[top]), top.to_string());
    }

    #[test]
    fn serialize_is_left_inverse_of_parse() {
        let parser = ChannelRangeParser::default();
        for input in ["1", "1-3,5,8-10", "3,1,2", "10-12, 4 ,11", "1-1", "2,4,6-9,100"] {
            let parsed = parser.parse(input).unwrap();
            let again = parser.parse(&ChannelRangeParser::serialize(&parsed)).unwrap();
            assert_eq!(parsed, again, "round trip failed for {input:?}");
        }
    }

    #[test]
    fn reserved_prefix_concatenates() {
        assert_eq!(ChannelRangeParser::reserved_prefix("DDR", 3), "DDR3");
    }

    #[test]
    fn detects_reserved_name_collisions() {
        let channels = [1, 2];
        assert!(ChannelRangeParser::is_reserved_name_collision(
            "CH1_Data", "CH", &channels
        ));
        assert!(ChannelRangeParser::is_reserved_name_collision(
            "ch2_clk", "CH", &channels
        ));
        assert!(!ChannelRangeParser::is_reserved_name_collision(
            "Data_CH1", "CH", &channels
        ));
        assert!(!ChannelRangeParser::is_reserved_name_collision(
            "CH3_Data", "CH", &channels
        ));
    }
}
