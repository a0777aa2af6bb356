//! Reply decoding.
//!
//! Replies echo the second letter of the opcode, the set id and a status:
//! `a 01 OK01x` (accepted, power on) or `a 01 NG01x` (refused). The trailing
//! `x` terminates every reply. Matching is case-insensitive.

use crate::command;
use regex::bytes::{Regex, RegexBuilder};
use room_core::{DriverError, DriverResult, MatchOutcome, MatchRule, ValueCodec};
use tracing::debug;

/// Terminates the acknowledgement of a `Set`, accepted or refused.
pub const ACK_PATTERN: &str = r"[cembladf] [a-f0-9]{2} (?:OK|NG).*?x";

/// A refused frame, capturing the reply letter.
pub const REJECT_PATTERN: &str = r"([cembladf]) [a-f0-9]{2} NG.*?x";

/// Marker of a refusal inside an acknowledgement.
pub const REJECT_TOKEN: &[u8] = b"NG";

pub(crate) fn compile(pattern: &str) -> DriverResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| DriverError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// What a refusal with reply letter `letter` was about.
///
/// Several commands share the `mc` opcode, so a `c` refusal cannot be
/// narrowed down any further.
pub fn reject_label(letter: char) -> Option<&'static str> {
    let label = match letter.to_ascii_lowercase() {
        'c' => "Aspect Ratio/Channel/Closed Caption/Keypad/Menu Navigation",
        'e' => "Audio Mute",
        'm' => "Executive Mode",
        'b' => "Input",
        'l' => "On Screen Display",
        'a' => "Power",
        'd' => "Video Mute",
        'f' => "Volume",
        _ => return None,
    };
    Some(label)
}

/// One rule decoding `<letter> <id> OK<data>x` through `codec`.
fn status_rule(
    command: &'static str,
    letter: char,
    data: &str,
    codec: ValueCodec,
) -> DriverResult<MatchRule> {
    let pattern = compile(&format!(r"{} [a-f0-9]{{2}} OK({})x", letter, data))?;
    Ok(MatchRule::new(pattern, move |caps, _tag| {
        let token = String::from_utf8_lossy(&caps[1]);
        match codec.decode(&token) {
            Some(value) => MatchOutcome::status(command, value),
            None => {
                debug!(command, %token, "reply value outside the command's range");
                MatchOutcome::Ignored
            }
        }
    }))
}

fn reject_rule() -> DriverResult<MatchRule> {
    Ok(MatchRule::new(compile(REJECT_PATTERN)?, |caps, _tag| {
        let letter = caps[1].first().copied().map(char::from).unwrap_or('?');
        MatchOutcome::Rejected {
            label: reject_label(letter).unwrap_or("Unknown").to_string(),
        }
    }))
}

/// Rules for the bidirectional serial link, in scan order.
pub fn match_rules() -> DriverResult<Vec<MatchRule>> {
    Ok(vec![
        status_rule("AspectRatio", 'c', "0[1269]", command::aspect_ratio())?,
        status_rule("AudioMute", 'e', "0[01]", command::audio_mute())?,
        status_rule("ExecutiveMode", 'm', "0[01]", command::on_off())?,
        status_rule("Input", 'b', "90|91|92|00|10|01|11", command::input())?,
        status_rule("OnScreenDisplay", 'l', "0[01]", command::on_off())?,
        status_rule("Power", 'a', "0[01]", command::on_off())?,
        status_rule("VideoMute", 'd', "00|01|10", command::video_mute())?,
        status_rule("Volume", 'f', "[0-9a-f]{2}", command::volume())?,
        reject_rule()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_core::{ResponseMatcher, StatusValue};
    use tracing_test::traced_test;

    fn matcher() -> ResponseMatcher {
        let mut matcher = ResponseMatcher::default();
        for rule in match_rules().unwrap() {
            assert!(matcher.add_match_string(rule));
        }
        matcher
    }

    #[test]
    fn decodes_every_status_reply() {
        let mut matcher = matcher();
        let cases: [(&[u8], &str, StatusValue); 8] = [
            (b"c 01 OK09x", "AspectRatio", StatusValue::from("Just Scan")),
            (b"e 01 OK00x", "AudioMute", "On".into()),
            (b"m 01 OK01x", "ExecutiveMode", "On".into()),
            (b"b 01 OK91x", "Input", "HDMI 2".into()),
            (b"l 01 OK00x", "OnScreenDisplay", "Off".into()),
            (b"a 01 OK01x", "Power", "On".into()),
            (b"d 01 OK10x", "VideoMute", "On (With OSD)".into()),
            (b"f 01 OK64x", "Volume", StatusValue::Int(100)),
        ];
        for (reply, command, value) in cases {
            assert_eq!(
                matcher.feed(reply),
                vec![MatchOutcome::status(command, value)],
                "reply {:?}",
                String::from_utf8_lossy(reply)
            );
        }
    }

    #[test]
    fn replies_are_case_insensitive() {
        let mut matcher = matcher();
        assert_eq!(
            matcher.feed(b"A 0c ok01X"),
            vec![MatchOutcome::status("Power", "On")]
        );
    }

    #[test]
    #[traced_test]
    fn out_of_range_volume_is_ignored() {
        let mut matcher = matcher();
        assert_eq!(matcher.feed(b"f 01 OKC8x"), vec![MatchOutcome::Ignored]);
        assert!(logs_contain("reply value outside the command's range"));
        assert!(logs_contain("C8"));
    }

    #[test]
    fn refusal_names_command_group() {
        let mut matcher = matcher();
        assert_eq!(
            matcher.feed(b"c 01 NG01x"),
            vec![MatchOutcome::Rejected {
                label: "Aspect Ratio/Channel/Closed Caption/Keypad/Menu Navigation".into()
            }]
        );
        assert_eq!(
            matcher.feed(b"F 01 NG00x"),
            vec![MatchOutcome::Rejected {
                label: "Volume".into()
            }]
        );
    }

    #[test]
    fn ack_pattern_accepts_both_outcomes() {
        let ack = compile(ACK_PATTERN).unwrap();
        assert!(ack.is_match(b"a 01 OK01x"));
        assert!(ack.is_match(b"a 01 NG01x"));
        assert!(!ack.is_match(b"a 01 OK01"));
    }
}
