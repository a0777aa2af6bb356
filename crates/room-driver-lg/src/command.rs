//! Command table for the LG xxUR640S9UD series.
//!
//! Every frame has the form `<opcode> <set id> <data>\r`. Queries send the
//! data byte `FF`; the display answers with the current value.

use crate::Profile;
use room_core::{
    CommandEntry, CommandTable, EncodeSet, EncodeUpdate, FrameContext, StatusValue, ValueCodec,
};

/// Data byte asking the display to report its current value.
pub const QUERY_DATA: &str = "FF";

/// Two-letter opcode plus the codec for its data byte.
#[derive(Debug, Clone)]
pub struct LgCommand {
    opcode: &'static str,
    codec: ValueCodec,
}

impl LgCommand {
    pub fn new(opcode: &'static str, codec: ValueCodec) -> Self {
        Self { opcode, codec }
    }

    pub fn opcode(&self) -> &'static str {
        self.opcode
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    fn frame(&self, ctx: &FrameContext<'_>, data: &str) -> String {
        format!("{} {} {}\r", self.opcode, ctx.device_id, data)
    }
}

impl EncodeSet for LgCommand {
    fn encode_set(&self, value: &StatusValue, ctx: &FrameContext<'_>) -> Option<String> {
        self.codec.encode(value).map(|data| self.frame(ctx, &data))
    }
}

impl EncodeUpdate for LgCommand {
    fn encode_update(&self, ctx: &FrameContext<'_>) -> String {
        self.frame(ctx, QUERY_DATA)
    }
}

pub(crate) fn aspect_ratio() -> ValueCodec {
    ValueCodec::table([
        ("4:3", "01"),
        ("16:9", "02"),
        ("Original", "06"),
        ("Just Scan", "09"),
    ])
}

pub(crate) fn audio_mute() -> ValueCodec {
    // Inverted on the wire: 00 mutes.
    ValueCodec::table([("On", "00"), ("Off", "01")])
}

pub(crate) fn on_off() -> ValueCodec {
    ValueCodec::table([("On", "01"), ("Off", "00")])
}

pub(crate) fn input() -> ValueCodec {
    ValueCodec::table([
        ("HDMI 1", "90"),
        ("HDMI 2", "91"),
        ("HDMI 3", "92"),
        ("DTV", "00"),
        ("ATV", "10"),
        ("CADTV", "01"),
        ("CATV", "11"),
    ])
}

pub(crate) fn video_mute() -> ValueCodec {
    ValueCodec::table([("On", "01"), ("Off", "00"), ("On (With OSD)", "10")])
}

pub(crate) fn volume() -> ValueCodec {
    ValueCodec::HexByte { min: 0, max: 100 }
}

fn keypad() -> ValueCodec {
    let digits = (0..=9).map(|d| (d.to_string(), format!("1{}", d)));
    ValueCodec::table(digits.chain(std::iter::once(("-".to_string(), "4C".to_string()))))
}

fn menu_navigation() -> ValueCodec {
    ValueCodec::table([
        ("Up", "40"),
        ("Down", "41"),
        ("Left", "07"),
        ("Right", "06"),
        ("Menu", "43"),
        ("OK", "44"),
        ("Exit", "5B"),
        ("Back", "28"),
    ])
}

fn channel() -> ValueCodec {
    ValueCodec::table([("Up", "00"), ("Down", "01")])
}

fn settable(name: &str, opcode: &'static str, codec: ValueCodec) -> CommandEntry {
    CommandEntry::new(name).with_set(LgCommand::new(opcode, codec))
}

fn queryable(name: &str, opcode: &'static str, codec: ValueCodec) -> CommandEntry {
    CommandEntry::new(name).with_codec(LgCommand::new(opcode, codec))
}

/// Build the table for `profile`.
///
/// The network control port accepts the same frames but never answers, so
/// no command there has a query path and power can only be switched off.
pub fn command_table(profile: Profile) -> CommandTable {
    let remote = CommandTable::new()
        .with(settable("Channel", "mc", channel()))
        .with(settable(
            "ClosedCaption",
            "mc",
            ValueCodec::Fixed("39".to_string()),
        ))
        .with(settable("Keypad", "mc", keypad()))
        .with(settable("MenuNavigation", "mc", menu_navigation()));

    match profile {
        Profile::Serial => remote
            .with(queryable("AspectRatio", "kc", aspect_ratio()))
            .with(queryable("AudioMute", "ke", audio_mute()))
            .with(queryable("ExecutiveMode", "km", on_off()))
            .with(queryable("Input", "xb", input()))
            .with(queryable("OnScreenDisplay", "kl", on_off()))
            .with(queryable("Power", "ka", on_off()))
            .with(queryable("VideoMute", "kd", video_mute()))
            .with(queryable("Volume", "kf", volume())),
        Profile::Ethernet => remote
            .with(settable("AspectRatio", "kc", aspect_ratio()))
            .with(settable("AudioMute", "ke", audio_mute()))
            .with(settable("ExecutiveMode", "km", on_off()))
            .with(settable("Input", "xb", input()))
            .with(settable("OnScreenDisplay", "kl", on_off()))
            .with(settable("PowerOff", "ka", ValueCodec::Fixed("00".to_string())))
            .with(settable("VideoMute", "kd", video_mute()))
            .with(settable("Volume", "kf", volume())),
    }
}
