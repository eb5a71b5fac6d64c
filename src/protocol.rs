use serde_json::Value;
use tracing::warn;

use crate::types::{Schedule, ScheduleEntry};
use crate::{Error, Result};

pub const EMS_RESOURCE_PATH: &str = "/ems.json";
pub const CONSOLE_RESOURCE_PATH: &str = "/console.json";

pub const SCHEDULE_LIST_COMMAND: &str = "sched_list";

const SUMMARY_PREFIX: &str = "Schedule get: ";
const SUMMARY_MIDDLE: &str = " schedules. Current ID: '";

/// Prefix `http://` unless the host already names a scheme.
pub fn build_url(host: &str, path: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}{path}")
    } else {
        format!("http://{host}{path}")
    }
}

/// Reject payloads that cannot be an `ems.json` snapshot.
pub fn validate_snapshot(body: &Value) -> Result<()> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::InvalidResponse("snapshot is not a JSON object".to_string()))?;

    if !obj.get("aggregated").is_some_and(Value::is_object) {
        return Err(Error::InvalidResponse("'aggregated' key missing".to_string()));
    }

    let mut has_list = false;
    for key in ["ems", "sensors"] {
        match obj.get(key) {
            Some(Value::Array(_)) => has_list = true,
            Some(_) => return Err(Error::InvalidResponse(format!("'{key}' is not an array"))),
            None => {}
        }
    }
    if !has_list {
        return Err(Error::InvalidResponse("neither 'ems' nor 'sensors' present".to_string()));
    }
    Ok(())
}

/// Parse the console transcript of `sched_list`.
///
/// Never fails: unrelated lines are ignored and malformed schedule lines are
/// skipped, so a garbage response yields an empty schedule.
pub fn parse_schedule(text: &str) -> Schedule {
    let mut schedule = Schedule::default();

    for line in text.lines() {
        let line = line.trim();

        if let Some((count, current_id)) = parse_summary(line) {
            schedule.count = count;
            schedule.current_id = Some(current_id);
            continue;
        }

        if !line.starts_with("id:") {
            continue;
        }

        if let Some(entry) = parse_entry(line) {
            schedule.entries.push(entry);
        }
    }

    schedule
}

fn parse_summary(line: &str) -> Option<(u32, String)> {
    let rest = line.strip_prefix(SUMMARY_PREFIX)?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    let count = rest[..digits_end].parse().ok()?;
    let rest = rest[digits_end..].strip_prefix(SUMMARY_MIDDLE)?;
    let (current_id, _) = rest.split_once('\'')?;
    Some((count, current_id.to_string()))
}

fn parse_entry(line: &str) -> Option<ScheduleEntry> {
    let mut fields: Vec<(&str, &str)> = Vec::new();
    for part in line.split(',') {
        if let Some((key, value)) = part.split_once(':') {
            fields.push((key.trim(), value.trim()));
        }
    }
    let field = |name: &str| {
        fields
            .iter()
            .rev()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    };

    let raw_id = field("id")?;
    let Ok(id) = raw_id.parse::<i64>() else {
        warn!(id = raw_id, "skipping schedule with invalid id");
        return None;
    };

    let (setpoint, setpoint_raw) = match field("setpoint") {
        Some(raw) => match raw.parse::<i64>() {
            Ok(v) => (Some(v), None),
            Err(_) => (None, Some(raw.to_string())),
        },
        None => (None, None),
    };

    Some(ScheduleEntry {
        id,
        schedule_type: field("type").map(str::to_string),
        from: field("from").map(str::to_string),
        to: field("to").map(str::to_string),
        setpoint,
        setpoint_raw,
        offline: field("offline").map(|v| v == "true"),
        max_discharge: field("max_discharge").map(str::to_string),
        max_charge: field("max_charge").map(str::to_string),
    })
}
