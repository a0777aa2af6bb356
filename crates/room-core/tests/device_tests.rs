//! Integration tests for the driver facade using the in-memory transport.
//!
//! The protocol below is a small two-command amplifier: a plain `Power`
//! command and a `Volume` command qualified per output channel, enough to
//! exercise qualifier addressing alongside the unqualified path.

use regex::bytes::Regex;
use room_core::mock::{MockHandle, MockTransport};
use room_core::{
    CommandEntry, CommandTable, ConnectionState, Device, DeviceId, DeviceOptions, DriverError,
    DriverResult, EncodeSet, EncodeUpdate, FrameContext, MatchOutcome, MatchRule, Protocol,
    Qualifier, SetOutcome, StatusChange, StatusValue, UpdateOutcome, ValueCodec,
    CONNECTION_STATUS,
};
use std::sync::{Arc, Mutex};
use tracing_test::traced_test;

// =============================================================================
// Test Protocol
// =============================================================================

struct AmpPower(ValueCodec);

impl EncodeSet for AmpPower {
    fn encode_set(&self, value: &StatusValue, ctx: &FrameContext<'_>) -> Option<String> {
        let token = self.0.encode(value)?;
        Some(format!("P{} {}\r", ctx.device_id, token))
    }
}

impl EncodeUpdate for AmpPower {
    fn encode_update(&self, ctx: &FrameContext<'_>) -> String {
        format!("P{} ?\r", ctx.device_id)
    }
}

struct AmpVolume;

impl EncodeSet for AmpVolume {
    fn encode_set(&self, value: &StatusValue, ctx: &FrameContext<'_>) -> Option<String> {
        let level = value.as_int().filter(|l| (0..=60).contains(l))?;
        let channel = ctx.qualifier.values().first()?;
        Some(format!("V{} {}:{}\r", ctx.device_id, channel, level))
    }
}

impl EncodeUpdate for AmpVolume {
    fn encode_update(&self, ctx: &FrameContext<'_>) -> String {
        let channel = ctx.qualifier.values().first().cloned().unwrap_or_default();
        format!("V{} {}?\r", ctx.device_id, channel)
    }
}

struct Amp;

impl Protocol for Amp {
    fn commands(&self) -> CommandTable {
        CommandTable::new()
            .with(
                CommandEntry::new("Power")
                    .with_codec(AmpPower(ValueCodec::table([("On", "1"), ("Off", "0")]))),
            )
            .with(
                CommandEntry::new("Volume")
                    .with_parameters(["Channel"])
                    .with_codec(AmpVolume),
            )
    }

    fn match_rules(&self) -> DriverResult<Vec<MatchRule>> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| DriverError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(vec![
            MatchRule::new(compile(r"PWR([01])\n")?, |caps, _| {
                let on = &caps[1] == b"1";
                MatchOutcome::status("Power", if on { "On" } else { "Off" })
            }),
            MatchRule::new(compile(r"VOL(\d):(\d+)\n")?, |caps, _| {
                let channel = String::from_utf8_lossy(&caps[1]).into_owned();
                match String::from_utf8_lossy(&caps[2]).parse::<i64>() {
                    Ok(level) => MatchOutcome::Status {
                        command: "Volume".into(),
                        value: level.into(),
                        qualifier: Some(Qualifier::new().with("Channel", channel)),
                    },
                    Err(_) => MatchOutcome::Ignored,
                }
            }),
            MatchRule::new(compile(r"ERR\n")?, |_, tag| MatchOutcome::Rejected {
                label: tag.unwrap_or("Amp").to_string(),
            })
            .with_tag("Amplifier"),
        ])
    }

    fn reply_delimiter(&self) -> DriverResult<Regex> {
        Regex::new(r"(?:OK|ERR)\n").map_err(|source| DriverError::InvalidPattern {
            pattern: "ack".into(),
            source,
        })
    }

    fn is_rejection(&self, reply: &[u8]) -> bool {
        reply.windows(3).any(|w| w == b"ERR")
    }
}

fn amp_with(options: DeviceOptions) -> (Device<MockTransport>, MockHandle) {
    let (transport, handle) = MockTransport::new();
    let device = Device::new(transport, Amp, options).expect("protocol installs");
    (device, handle)
}

fn amp() -> (Device<MockTransport>, MockHandle) {
    amp_with(DeviceOptions::named("amp"))
}

fn channel(n: &str) -> Qualifier {
    Qualifier::new().with("Channel", n)
}

type Calls = Arc<Mutex<Vec<(String, StatusValue, Option<Qualifier>)>>>;

fn recorder() -> (
    Calls,
    impl FnMut(&str, &StatusValue, Option<&Qualifier>) + Send + 'static,
) {
    let calls: Calls = Arc::default();
    let sink = calls.clone();
    (calls, move |cmd: &str, value: &StatusValue, q: Option<&Qualifier>| {
        sink.lock()
            .unwrap()
            .push((cmd.to_string(), value.clone(), q.cloned()))
    })
}

// =============================================================================
// Set / Update
// =============================================================================

#[tokio::test]
async fn set_then_reply_updates_status_and_notifies() {
    let (mut device, handle) = amp();
    let (calls, callback) = recorder();
    device.subscribe_status("Power", None, callback).unwrap();

    handle.queue_reply(b"OK\n");
    let outcome = device.set("Power", &"On".into(), None).await.unwrap();
    assert_eq!(outcome, SetOutcome::Accepted);
    assert_eq!(handle.sent_frames(), vec!["P01 1\r"]);

    device.receive(b"PWR1\n");
    assert_eq!(
        device.read_status("Power", None).unwrap(),
        Some(StatusValue::from("On"))
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("Power".to_string(), StatusValue::from("On"), None)]
    );
}

#[tokio::test]
#[traced_test]
async fn invalid_value_is_discarded_without_writing() {
    let (mut device, handle) = amp();

    let outcome = device.set("Power", &"Standby".into(), None).await.unwrap();
    assert_eq!(outcome, SetOutcome::Discarded);
    assert_eq!(handle.sent_count(), 0);
    assert!(logs_contain("Invalid Command for SetPower"));
}

#[tokio::test]
#[traced_test]
async fn missing_acknowledgement_times_out() {
    let (mut device, handle) = amp();
    handle.queue_timeout();

    let outcome = device.set("Power", &"Off".into(), None).await.unwrap();
    assert_eq!(outcome, SetOutcome::TimedOut);
    assert_eq!(device.read_status("Power", None).unwrap(), None);
    assert_eq!(device.connection_state(), ConnectionState::Connected);
    assert!(logs_contain("Power: Invalid/unexpected response"));
}

#[tokio::test]
#[traced_test]
async fn refused_set_is_reported() {
    let (mut device, handle) = amp();
    handle.queue_reply(b"ERR\n");

    let outcome = device.set("Power", &"On".into(), None).await.unwrap();
    assert_eq!(outcome, SetOutcome::Rejected);
    assert!(logs_contain("An error occurred: Power."));
}

#[tokio::test]
async fn update_sends_query_frame() {
    let (mut device, handle) = amp();
    let outcome = device.update("Volume", Some(&channel("2"))).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Sent);
    assert_eq!(handle.sent_frames(), vec!["V01 2?\r"]);
}

#[tokio::test]
async fn unknown_commands_are_errors() {
    let (mut device, _handle) = amp();

    assert!(matches!(
        device.set("Brightness", &1.into(), None).await,
        Err(DriverError::UnsupportedCommand { .. })
    ));
    assert!(matches!(
        device.update("Brightness", None).await,
        Err(DriverError::UnsupportedCommand { .. })
    ));
    assert!(device.subscribe_status("Brightness", None, |_, _, _| {}).is_err());
    assert!(device.read_status("Brightness", None).is_err());
}

#[tokio::test]
async fn connection_status_cannot_be_set() {
    let (mut device, handle) = amp();
    let err = device
        .set(CONNECTION_STATUS, &"Connected".into(), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "ConnectionStatus does not support Set");

    let err = device.update(CONNECTION_STATUS, None).await.unwrap_err();
    assert_eq!(err.to_string(), "ConnectionStatus does not support Update");
    assert_eq!(handle.sent_count(), 0);
}

#[tokio::test]
async fn write_only_device_still_refuses_commands_without_query() {
    let options = DeviceOptions {
        unidirectional: true,
        ..DeviceOptions::named("amp")
    };
    let (mut device, handle) = amp_with(options);

    assert!(matches!(
        device.update(CONNECTION_STATUS, None).await,
        Err(DriverError::UnsupportedCommand { .. })
    ));
    assert_eq!(
        device.update("Power", None).await.unwrap(),
        UpdateOutcome::Discarded
    );
    assert_eq!(handle.sent_count(), 0);
}

#[tokio::test]
async fn link_failure_surfaces_as_transport_error() {
    let (mut device, handle) = amp();
    handle.close();
    assert!(matches!(
        device.update("Power", None).await,
        Err(DriverError::Transport(_))
    ));
}

// =============================================================================
// Status cache and subscriptions
// =============================================================================

#[tokio::test]
async fn repeated_value_notifies_once() {
    let (mut device, _handle) = amp();
    let (calls, callback) = recorder();
    device.subscribe_status("Power", None, callback).unwrap();

    device.receive(b"PWR1\n");
    device.receive(b"PWR1\n");
    device.receive(b"PWR1\nPWR1\n");
    assert_eq!(calls.lock().unwrap().len(), 1);

    device.receive(b"PWR0\n");
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn qualified_subscriptions_are_isolated() {
    let (mut device, _handle) = amp();
    let (calls, callback) = recorder();
    device
        .subscribe_status("Volume", Some(&channel("1")), callback)
        .unwrap();

    device.receive(b"VOL2:30\n");
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(
        device.read_status("Volume", Some(&channel("2"))).unwrap(),
        Some(StatusValue::Int(30))
    );
    assert_eq!(device.read_status("Volume", Some(&channel("1"))).unwrap(), None);

    device.receive(b"VOL1:12\n");
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, StatusValue::Int(12));
    assert_eq!(calls[0].2, Some(channel("1")));
}

#[tokio::test]
async fn incomplete_qualifier_fails_closed() {
    let (mut device, handle) = amp();
    let wrong = Qualifier::new().with("Zone", "1");

    let (calls, callback) = recorder();
    device.subscribe_status("Volume", Some(&wrong), callback).unwrap();
    assert_eq!(device.read_status("Volume", Some(&wrong)).unwrap(), None);

    let outcome = device.set("Volume", &10.into(), Some(&wrong)).await.unwrap();
    assert_eq!(outcome, SetOutcome::Discarded);
    assert_eq!(handle.sent_count(), 0);

    device.receive(b"VOL1:12\n");
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn resubscribing_replaces_previous_callback() {
    let (mut device, _handle) = amp();
    let (first, first_cb) = recorder();
    let (second, second_cb) = recorder();
    device.subscribe_status("Power", None, first_cb).unwrap();
    device.subscribe_status("Power", None, second_cb).unwrap();

    device.receive(b"PWR1\n");
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn observers_see_every_path() {
    let (mut device, _handle) = amp();
    let seen: Arc<Mutex<Vec<StatusChange>>> = Arc::default();
    let sink = seen.clone();
    device.observe(move |change| sink.lock().unwrap().push(change.clone()));

    device.receive(b"PWR1\nVOL1:5\nVOL2:6\n");
    let seen = seen.lock().unwrap();
    let commands: Vec<&str> = seen.iter().map(|c| c.command.as_str()).collect();
    assert_eq!(commands, vec!["Power", "Volume", "Volume"]);
}

#[tokio::test]
#[traced_test]
async fn rejected_reply_leaves_status_untouched() {
    let (mut device, _handle) = amp();
    device.receive(b"PWR1\n");
    device.receive(b"ERR\n");

    assert_eq!(
        device.read_status("Power", None).unwrap(),
        Some(StatusValue::from("On"))
    );
    assert!(logs_contain("An error occurred: Amplifier."));
}

// =============================================================================
// Liveness
// =============================================================================

#[tokio::test]
async fn liveness_transitions_fire_exactly_once() {
    let options = DeviceOptions {
        disconnect_limit: 3,
        ..DeviceOptions::named("amp")
    };
    let (mut device, _handle) = amp_with(options);
    let (calls, callback) = recorder();
    device
        .subscribe_status(CONNECTION_STATUS, None, callback)
        .unwrap();

    for _ in 0..10 {
        device.update("Power", None).await.unwrap();
    }
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);

    device.receive(b"PWR1\n");
    device.receive(b"PWR0\n");
    assert_eq!(device.connection_state(), ConnectionState::Connected);

    let states: Vec<String> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, value, _)| value.to_string())
        .collect();
    assert_eq!(states, vec!["Connected", "Disconnected", "Connected"]);
}

#[tokio::test]
async fn replies_keep_the_link_alive() {
    let options = DeviceOptions {
        disconnect_limit: 2,
        ..DeviceOptions::named("amp")
    };
    let (mut device, _handle) = amp_with(options);

    for _ in 0..10 {
        device.update("Power", None).await.unwrap();
        device.receive(b"PWR1\n");
    }
    assert_eq!(device.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn link_drop_and_recovery() {
    let (mut device, _handle) = amp();
    device.receive(b"PWR");
    assert_eq!(device.buffered_len(), 3);

    device.mark_link_down();
    assert_eq!(device.buffered_len(), 0);
    assert_eq!(
        device.read_status(CONNECTION_STATUS, None).unwrap(),
        Some(StatusValue::from("Disconnected"))
    );

    device.mark_link_up();
    assert_eq!(device.connection_state(), ConnectionState::Connected);
    assert_eq!(
        device.read_status(CONNECTION_STATUS, None).unwrap(),
        Some(StatusValue::from("Connected"))
    );
}

// =============================================================================
// Write-only addressing and buffer bounds
// =============================================================================

#[tokio::test]
#[traced_test]
async fn broadcast_id_is_write_only() {
    let options = DeviceOptions {
        device_id: DeviceId::broadcast(),
        ..DeviceOptions::named("all")
    };
    let (mut device, handle) = amp_with(options);
    assert!(device.is_write_only());

    let outcome = device.set("Power", &"On".into(), None).await.unwrap();
    assert_eq!(outcome, SetOutcome::Sent);
    assert_eq!(handle.sent_frames(), vec!["P00 1\r"]);

    let outcome = device.update("Power", None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Discarded);
    assert_eq!(handle.sent_count(), 1);
    assert!(logs_contain("Inappropriate Command Power"));

    device.receive(b"PWR1\n");
    assert_eq!(device.read_status("Power", None).unwrap(), None);
}

#[tokio::test]
async fn unmatched_input_never_exceeds_cap() {
    let options = DeviceOptions {
        max_buffer: 64,
        ..DeviceOptions::named("amp")
    };
    let (mut device, _handle) = amp_with(options);

    for _ in 0..50 {
        device.receive(b"#### line noise ####");
        assert!(device.buffered_len() <= 64);
    }

    // A complete reply still decodes after the noise.
    device.receive(b"PWR1\n");
    assert_eq!(
        device.read_status("Power", None).unwrap(),
        Some(StatusValue::from("On"))
    );
}
