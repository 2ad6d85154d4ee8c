use chrono::{DateTime, Local};
use vmlink_controller::LinkEvent;
use vmlink_protocol::TemperaturePanel;

/// Renders link events on stdout.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn print(&self, event: &LinkEvent) {
        println!("{}", self.render(event, Local::now()));
    }

    pub fn render(&self, event: &LinkEvent, at: DateTime<Local>) -> String {
        let time = at.format("%H:%M:%S").to_string();
        if self.json {
            serde_json::json!({ "time": time, "event": event }).to_string()
        } else {
            format!("[{time}] {}", describe(event))
        }
    }
}

/// One-line human readable description of an event.
pub fn describe(event: &LinkEvent) -> String {
    match event {
        LinkEvent::Timeout { message, state } => format!("{message} (waiting in {state})"),
        LinkEvent::FirmwareInfo(info) => format!("Firmware: {}", info.trim_end()),
        LinkEvent::TemperatureStatus(frame) => match TemperaturePanel::parse(frame.as_bytes()) {
            Ok(panel) => format!(
                "{panel}, CP {}, FN {}, DOOR {}",
                panel.compressor, panel.fan, panel.door
            ),
            Err(_) => format!("Temperature: {}", frame.trim_end()),
        },
        LinkEvent::CompressorAck(ok) => format!("Compressor: {}", ack(*ok)),
        LinkEvent::DoorAck(ok) => format!("Door: {}", ack(*ok)),
        LinkEvent::DispensePhase { success, state } => {
            let mut line = format!("Dispense {} -> {state}", ack(*success));
            if let Some(code) = state.fault_event_code() {
                line.push_str(&format!(" (event {code})"));
            }
            line
        }
    }
}

/// Returns `true` if the event reports a failed operation.
pub fn is_failure(event: &LinkEvent) -> bool {
    matches!(
        event,
        LinkEvent::Timeout { .. }
            | LinkEvent::CompressorAck(false)
            | LinkEvent::DoorAck(false)
            | LinkEvent::DispensePhase { success: false, .. }
    )
}

fn ack(ok: bool) -> &'static str {
    if ok { "ok" } else { "failed" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use vmlink_core::ControlState;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
    }

    #[rstest]
    #[case(LinkEvent::FirmwareInfo("VMIF1.0.0".into()), "Firmware: VMIF1.0.0")]
    #[case(LinkEvent::CompressorAck(true), "Compressor: ok")]
    #[case(LinkEvent::DoorAck(false), "Door: failed")]
    #[case(
        LinkEvent::DispensePhase { success: true, state: ControlState::WaitDispenseDone },
        "Dispense ok -> WaitDispenseDone"
    )]
    #[case(
        LinkEvent::DispensePhase { success: false, state: ControlState::ErrorCargo },
        "Dispense failed -> ErrorCargo (event 09)"
    )]
    #[case(
        LinkEvent::Timeout { message: "Timeout: CH".into(), state: ControlState::WaitDispenseOk },
        "Timeout: CH (waiting in WaitDispenseOk)"
    )]
    fn test_describe(#[case] event: LinkEvent, #[case] expected: &str) {
        assert_eq!(describe(&event), expected);
    }

    #[test]
    fn test_short_temperature_frame_printed_raw() {
        let event = LinkEvent::TemperatureStatus("TPAL+04.5C".into());
        assert_eq!(describe(&event), "Temperature: TPAL+04.5C");
    }

    #[test]
    fn test_render_timestamp() {
        let line = Printer::new(false).render(&LinkEvent::CompressorAck(true), noon());
        assert_eq!(line, "[12:30:05] Compressor: ok");
    }

    #[test]
    fn test_render_json() {
        let line = Printer::new(true).render(&LinkEvent::DoorAck(true), noon());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["time"], "12:30:05");
        assert_eq!(value["event"]["door_ack"], true);
    }

    #[test]
    fn test_failures() {
        assert!(is_failure(&LinkEvent::CompressorAck(false)));
        assert!(!is_failure(&LinkEvent::FirmwareInfo(String::new())));
        assert!(!is_failure(&LinkEvent::DispensePhase {
            success: true,
            state: ControlState::Idle
        }));
    }
}
