//! Named values read out of a published [`HomevoltData`].
//!
//! Each [`SensorDescription`] pairs display metadata with a plain function
//! that extracts its value. [`build_entities`] expands the table against a
//! snapshot: aggregate descriptions once, per-EMS descriptions once per EMS
//! device, per-sensor descriptions once per available sensor kind.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

use crate::types::*;

pub const DOMAIN: &str = "homevolt_local";
pub const MANUFACTURER: &str = "Homevolt";
pub const NO_ACTIVE_SCHEDULE: &str = "No active schedule";

const MAX_STATE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Battery,
    Power,
    Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Aggregate,
    PerEms,
    PerSensor(SensorKind),
}

/// How a description computes its value.
///
/// `Ems` functions run against the aggregate record for aggregate scope and
/// against the indexed EMS device for per-EMS scope.
#[derive(Clone, Copy)]
pub enum ValueFn {
    Snapshot(fn(&HomevoltData) -> Option<SensorValue>),
    Ems(fn(&EmsDevice) -> Option<SensorValue>),
    Sensor(fn(&SensorData) -> Option<SensorValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    None,
    Static(&'static str),
    /// Battery level glyph from the target's average SoC.
    BatteryLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    None,
    Schedules,
    ErrorStr,
    Phases,
}

pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: Icon,
    pub scope: Scope,
    pub value: ValueFn,
    pub attributes: Attributes,
}

const fn describe(
    key: &'static str,
    name: &'static str,
    scope: Scope,
    value: ValueFn,
) -> SensorDescription {
    SensorDescription {
        key,
        name,
        unit: None,
        device_class: None,
        state_class: None,
        icon: Icon::None,
        scope,
        value,
        attributes: Attributes::None,
    }
}

const fn power(
    key: &'static str,
    name: &'static str,
    icon: &'static str,
    scope: Scope,
    value: ValueFn,
) -> SensorDescription {
    SensorDescription {
        unit: Some("W"),
        device_class: Some(DeviceClass::Power),
        state_class: Some(StateClass::Measurement),
        icon: Icon::Static(icon),
        ..describe(key, name, scope, value)
    }
}

const fn energy(
    key: &'static str,
    name: &'static str,
    icon: &'static str,
    scope: Scope,
    value: ValueFn,
) -> SensorDescription {
    SensorDescription {
        unit: Some("kWh"),
        device_class: Some(DeviceClass::Energy),
        state_class: Some(StateClass::Total),
        icon: Icon::Static(icon),
        ..describe(key, name, scope, value)
    }
}

const fn battery(
    key: &'static str,
    name: &'static str,
    scope: Scope,
    value: ValueFn,
) -> SensorDescription {
    SensorDescription {
        unit: Some("%"),
        device_class: Some(DeviceClass::Battery),
        state_class: Some(StateClass::Measurement),
        ..describe(key, name, scope, value)
    }
}

const GRID: Scope = Scope::PerSensor(SensorKind::Grid);
const SOLAR: Scope = Scope::PerSensor(SensorKind::Solar);
const LOAD: Scope = Scope::PerSensor(SensorKind::Load);

pub static SENSOR_DESCRIPTIONS: &[SensorDescription] = &[
    SensorDescription {
        icon: Icon::BatteryLevel,
        ..describe("ems", "Homevolt Status", Scope::Aggregate, ValueFn::Ems(state_str))
    },
    SensorDescription {
        icon: Icon::Static("mdi:calendar-clock"),
        attributes: Attributes::Schedules,
        ..describe(
            "current_schedule",
            "Homevolt Current Schedule",
            Scope::Aggregate,
            ValueFn::Snapshot(current_schedule),
        )
    },
    SensorDescription {
        icon: Icon::Static("mdi:battery-unknown"),
        attributes: Attributes::ErrorStr,
        ..describe("ems_error", "Homevolt Error", Scope::Aggregate, ValueFn::Ems(error_str))
    },
    battery("total_soc", "Homevolt Total SoC", Scope::Aggregate, ValueFn::Snapshot(total_soc)),
    power(
        "power",
        "Homevolt Power",
        "mdi:battery-sync-outline",
        Scope::Aggregate,
        ValueFn::Ems(ems_power),
    ),
    energy(
        "energy_produced",
        "Homevolt Energy Produced",
        "mdi:battery-positive",
        Scope::Aggregate,
        ValueFn::Ems(ems_energy_produced),
    ),
    energy(
        "energy_consumed",
        "Homevolt Energy Consumed",
        "mdi:battery-negative",
        Scope::Aggregate,
        ValueFn::Ems(ems_energy_consumed),
    ),
    battery("battery_soc", "Homevolt battery SoC", Scope::PerEms, ValueFn::Ems(device_soc)),
    SensorDescription {
        icon: Icon::BatteryLevel,
        ..describe("device_status", "Status", Scope::PerEms, ValueFn::Ems(state_str))
    },
    power(
        "device_power",
        "Power",
        "mdi:battery-sync-outline",
        Scope::PerEms,
        ValueFn::Ems(ems_power),
    ),
    energy(
        "device_energy_produced",
        "Energy Produced",
        "mdi:battery-positive",
        Scope::PerEms,
        ValueFn::Ems(ems_energy_produced),
    ),
    energy(
        "device_energy_consumed",
        "Energy Consumed",
        "mdi:battery-negative",
        Scope::PerEms,
        ValueFn::Ems(ems_energy_consumed),
    ),
    SensorDescription {
        icon: Icon::Static("mdi:battery-unknown"),
        attributes: Attributes::ErrorStr,
        ..describe("device_error", "Error", Scope::PerEms, ValueFn::Ems(error_str))
    },
    SensorDescription {
        attributes: Attributes::Phases,
        ..power("grid_power", "Power", "mdi:transmission-tower", GRID, ValueFn::Sensor(total_power))
    },
    energy(
        "grid_energy_imported",
        "Energy Imported",
        "mdi:transmission-tower-import",
        GRID,
        ValueFn::Sensor(energy_imported),
    ),
    energy(
        "grid_energy_exported",
        "Energy Exported",
        "mdi:transmission-tower-export",
        GRID,
        ValueFn::Sensor(energy_exported),
    ),
    SensorDescription {
        attributes: Attributes::Phases,
        ..power("solar_power", "Power", "mdi:solar-power", SOLAR, ValueFn::Sensor(total_power))
    },
    energy(
        "solar_energy_imported",
        "Energy Imported",
        "mdi:solar-power-variant-outline",
        SOLAR,
        ValueFn::Sensor(energy_imported),
    ),
    energy(
        "solar_energy_exported",
        "Energy Exported",
        "mdi:solar-power-variant",
        SOLAR,
        ValueFn::Sensor(energy_exported),
    ),
    SensorDescription {
        attributes: Attributes::Phases,
        ..power(
            "load_power",
            "Power",
            "mdi:home-lightning-bolt",
            LOAD,
            ValueFn::Sensor(total_power),
        )
    },
    energy(
        "load_energy_imported",
        "Energy Imported",
        "mdi:home-import-outline",
        LOAD,
        ValueFn::Sensor(energy_imported),
    ),
    energy(
        "load_energy_exported",
        "Energy Exported",
        "mdi:home-export-outline",
        LOAD,
        ValueFn::Sensor(energy_exported),
    ),
];

fn state_str(ems: &EmsDevice) -> Option<SensorValue> {
    Some(SensorValue::Text(ems.ems_data.state_str.clone()))
}

fn error_str(ems: &EmsDevice) -> Option<SensorValue> {
    if ems.error_str.is_empty() {
        return None;
    }
    let truncated: String = ems.error_str.chars().take(MAX_STATE_LEN).collect();
    Some(SensorValue::Text(truncated))
}

fn ems_power(ems: &EmsDevice) -> Option<SensorValue> {
    Some(SensorValue::Number(ems.ems_data.power))
}

fn ems_energy_produced(ems: &EmsDevice) -> Option<SensorValue> {
    Some(SensorValue::Number(ems.ems_data.energy_produced / 1000.0))
}

fn ems_energy_consumed(ems: &EmsDevice) -> Option<SensorValue> {
    Some(SensorValue::Number(ems.ems_data.energy_consumed / 1000.0))
}

// SoC is reported in hundredths of a percent.
fn device_soc(ems: &EmsDevice) -> Option<SensorValue> {
    let module = ems.bms_data.get(BMS_DATA_INDEX_DEVICE)?;
    Some(SensorValue::Number(module.soc / 100.0))
}

fn total_soc(data: &HomevoltData) -> Option<SensorValue> {
    let total = data.aggregated.bms_data.get(BMS_DATA_INDEX_TOTAL)?;
    Some(SensorValue::Number(total.soc / 100.0))
}

fn total_power(sensor: &SensorData) -> Option<SensorValue> {
    Some(SensorValue::Number(sensor.total_power))
}

fn energy_imported(sensor: &SensorData) -> Option<SensorValue> {
    Some(SensorValue::Number(sensor.energy_imported))
}

fn energy_exported(sensor: &SensorData) -> Option<SensorValue> {
    Some(SensorValue::Number(sensor.energy_exported))
}

fn current_schedule(data: &HomevoltData) -> Option<SensorValue> {
    Some(SensorValue::Text(current_schedule_at(data, Utc::now())))
}

/// Type of the schedule entry whose `[from, to)` window holds `now`.
///
/// Schedule timestamps carry no zone and are taken as UTC.
pub fn current_schedule_at(data: &HomevoltData, now: DateTime<Utc>) -> String {
    for entry in &data.schedules {
        let (Some(from), Some(to)) = (
            entry.from.as_deref().and_then(parse_schedule_time),
            entry.to.as_deref().and_then(parse_schedule_time),
        ) else {
            continue;
        };
        if from <= now && now < to {
            return entry.schedule_type.clone().unwrap_or_default();
        }
    }
    NO_ACTIVE_SCHEDULE.to_string()
}

fn parse_schedule_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn battery_icon(soc: f64) -> String {
    if soc < 5.0 {
        return "mdi:battery-outline".to_string();
    }
    // halves round to even: 45 -> battery-40, 55 -> battery-60
    let level = ((soc / 10.0).round_ties_even() * 10.0) as i64;
    format!("mdi:battery-{level}")
}

/// What a [`SensorEntity`] reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Aggregate,
    Ems(usize),
    Sensor(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub via_device: Option<String>,
}

#[derive(Clone, Copy)]
pub struct SensorEntity {
    pub description: &'static SensorDescription,
    pub target: Target,
}

impl SensorEntity {
    /// Per-sensor entities read the sensor they were built for, which is the
    /// first available one of their kind.
    pub fn value(&self, data: &HomevoltData) -> Option<SensorValue> {
        match (self.description.value, self.target) {
            (ValueFn::Snapshot(f), _) => f(data),
            (ValueFn::Ems(f), Target::Aggregate) => f(&data.aggregated),
            (ValueFn::Ems(f), Target::Ems(idx)) => data.ems.get(idx).and_then(f),
            (ValueFn::Sensor(f), Target::Sensor(idx)) => data.sensors.get(idx).and_then(f),
            (ValueFn::Sensor(f), _) => match self.description.scope {
                Scope::PerSensor(kind) => data
                    .sensors
                    .iter()
                    .find(|s| s.kind() == Some(kind))
                    .and_then(f),
                _ => None,
            },
            (ValueFn::Ems(_), Target::Sensor(_)) => None,
        }
    }

    pub fn icon(&self, data: &HomevoltData) -> Option<String> {
        match self.description.icon {
            Icon::None => None,
            Icon::Static(icon) => Some(icon.to_string()),
            Icon::BatteryLevel => {
                let soc = match self.target {
                    Target::Ems(idx) => data.ems.get(idx).map(|e| e.ems_data.soc_avg),
                    _ => Some(data.aggregated.ems_data.soc_avg),
                };
                Some(soc.map_or_else(|| "mdi:battery-outline".to_string(), battery_icon))
            }
        }
    }

    pub fn attributes(&self, data: &HomevoltData) -> Map<String, Value> {
        let mut attrs = Map::new();
        match self.description.attributes {
            Attributes::None => {}
            Attributes::Schedules => {
                attrs.insert("schedules".to_string(), json!(data.schedules));
                attrs.insert("schedule_count".to_string(), json!(data.schedule_count));
                attrs.insert("current_id".to_string(), json!(data.schedule_current_id));
            }
            Attributes::ErrorStr => {
                let error = match self.target {
                    Target::Ems(idx) => data.ems.get(idx).map(|e| e.error_str.as_str()),
                    _ => Some(data.aggregated.error_str.as_str()),
                };
                attrs.insert("error_str".to_string(), json!(error.unwrap_or_default()));
            }
            Attributes::Phases => {
                let phases = match self.target {
                    Target::Sensor(idx) => data.sensors.get(idx).map(|s| &s.phase),
                    _ => None,
                };
                attrs.insert("phase".to_string(), json!(phases));
            }
        }
        attrs
    }

    /// Registry id that survives IP address changes for EMS and sensor entities.
    pub fn unique_id(&self, data: &HomevoltData, host: &str) -> String {
        let key = self.description.key;
        match self.target {
            Target::Ems(idx) => match data.ems.get(idx).and_then(|e| e.ecu_id.as_ref()) {
                Some(id) => format!("{DOMAIN}_{key}_ems_{id}"),
                None => format!("{DOMAIN}_{key}_ems_unknown_{idx}"),
            },
            Target::Sensor(idx) => match data.sensors.get(idx).filter(|s| !s.euid.is_empty()) {
                Some(sensor) => format!("{DOMAIN}_{key}_sensor_{}", sensor.euid),
                None => format!("{DOMAIN}_{key}_sensor_unknown_{idx}"),
            },
            Target::Aggregate => format!("{DOMAIN}_{key}_{}", host_label(host)),
        }
    }

    pub fn device_info(&self, data: &HomevoltData, host: &str) -> DeviceInfo {
        let host = host_label(host);
        let main_id = format!("homevolt_{host}");
        match self.target {
            Target::Aggregate => DeviceInfo {
                identifier: main_id,
                name: format!("Homevolt Local ({host})"),
                manufacturer: MANUFACTURER,
                model: "Energy Management System".to_string(),
                sw_version: None,
                hw_version: None,
                via_device: None,
            },
            Target::Ems(idx) => match data.ems.get(idx) {
                Some(ems) => {
                    let ecu_id = ems
                        .ecu_id
                        .as_ref()
                        .map_or_else(|| format!("unknown_{idx}"), ToString::to_string);
                    let fw = &ems.ems_info.fw_version;
                    DeviceInfo {
                        identifier: format!("ems_{ecu_id}"),
                        name: format!("Homevolt EMS {ecu_id}"),
                        manufacturer: MANUFACTURER,
                        model: format!("Energy Management System {fw}").trim_end().to_string(),
                        sw_version: Some(fw.clone()),
                        hw_version: Some(ems.inv_info.serial_number.clone()),
                        via_device: Some(main_id),
                    }
                }
                None => DeviceInfo {
                    identifier: format!("ems_unknown_{idx}"),
                    name: format!("Homevolt EMS {}", idx + 1),
                    manufacturer: MANUFACTURER,
                    model: "Energy Management System".to_string(),
                    sw_version: None,
                    hw_version: None,
                    via_device: Some(main_id),
                },
            },
            Target::Sensor(idx) => match data.sensors.get(idx) {
                Some(sensor) => {
                    let type_name = sensor
                        .kind()
                        .map_or("Unknown", |k| k.display_name());
                    let euid = if sensor.euid.is_empty() {
                        "unknown"
                    } else {
                        sensor.euid.as_str()
                    };
                    DeviceInfo {
                        identifier: format!("sensor_{euid}"),
                        name: format!("Homevolt {type_name}"),
                        manufacturer: MANUFACTURER,
                        model: format!("{type_name} Sensor (Node {})", sensor.node_id),
                        sw_version: None,
                        hw_version: None,
                        via_device: Some(main_id),
                    }
                }
                None => DeviceInfo {
                    identifier: format!("sensor_unknown_{idx}"),
                    name: format!("Homevolt Sensor {}", idx + 1),
                    manufacturer: MANUFACTURER,
                    model: "Sensor".to_string(),
                    sw_version: None,
                    hw_version: None,
                    via_device: Some(main_id),
                },
            },
        }
    }
}

/// `http://192.168.1.10/ems.json` -> `192.168.1.10`.
pub fn host_label(host: &str) -> &str {
    let rest = host.split_once("://").map_or(host, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

/// Expand the description table against a snapshot.
pub fn build_entities(data: &HomevoltData) -> Vec<SensorEntity> {
    let mut entities = Vec::new();

    for description in SENSOR_DESCRIPTIONS {
        if description.scope == Scope::Aggregate {
            entities.push(SensorEntity {
                description,
                target: Target::Aggregate,
            });
        }
    }

    for idx in 0..data.ems.len() {
        for description in SENSOR_DESCRIPTIONS {
            if description.scope == Scope::PerEms {
                entities.push(SensorEntity {
                    description,
                    target: Target::Ems(idx),
                });
            }
        }
    }

    for description in SENSOR_DESCRIPTIONS {
        let Scope::PerSensor(kind) = description.scope else {
            continue;
        };
        if let Some(idx) = data
            .sensors
            .iter()
            .position(|s| s.available && s.kind() == Some(kind))
        {
            entities.push(SensorEntity {
                description,
                target: Target::Sensor(idx),
            });
        }
    }

    entities
}

pub fn description(key: &str) -> Option<&'static SensorDescription> {
    SENSOR_DESCRIPTIONS.iter().find(|d| d.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> HomevoltData {
        let mut data = HomevoltData::from_json(&json!({
            "aggregated": {
                "ems_data": {"state_str": "idle", "soc_avg": 47.0, "power": 100.0,
                             "energy_produced": 1500.0, "energy_consumed": 500.0},
                "error_str": "",
                "bms_data": [{"soc": 5000}, {"soc": 7550}]
            },
            "ems": [{
                "ecu_id": 987654,
                "ems_data": {"state_str": "charging", "soc_avg": 96.0, "power": -250.0},
                "error_str": "over temperature",
                "ems_info": {"fw_version": "1.0.0"},
                "inv_info": {"serial_number": "inv_0"},
                "bms_data": [{"soc": 9600}]
            }],
            "sensors": [
                {"euid": "g1", "type": "grid", "node_id": 3, "total_power": 200.0,
                 "energy_imported": 2000.0,
                 "phase": [{"voltage": 230.0, "amp": 1.0, "power": 230.0, "pf": 1.0}]},
                {"euid": "0000000000000000", "type": "load", "available": false, "total_power": 5.0}
            ]
        }))
        .unwrap();
        data.schedules = vec![ScheduleEntry {
            id: 0,
            schedule_type: Some("Idle schedule".to_string()),
            from: Some("2025-08-23T23:00:00".to_string()),
            to: Some("2025-08-23T23:30:00".to_string()),
            ..Default::default()
        }];
        data
    }

    fn entity(key: &str, target: Target) -> SensorEntity {
        SensorEntity {
            description: description(key).unwrap(),
            target,
        }
    }

    #[test]
    fn keys_are_unique() {
        for (i, a) in SENSOR_DESCRIPTIONS.iter().enumerate() {
            assert!(
                SENSOR_DESCRIPTIONS[i + 1..].iter().all(|b| b.key != a.key),
                "duplicate key {}",
                a.key
            );
        }
    }

    #[test]
    fn entities_expand_per_ems_and_available_kind() {
        let data = snapshot();
        let entities = build_entities(&data);
        let aggregate = entities.iter().filter(|e| e.target == Target::Aggregate).count();
        let per_ems = entities.iter().filter(|e| matches!(e.target, Target::Ems(0))).count();
        let per_sensor: Vec<&str> = entities
            .iter()
            .filter(|e| matches!(e.target, Target::Sensor(_)))
            .map(|e| e.description.key)
            .collect();
        assert_eq!(aggregate, 7);
        assert_eq!(per_ems, 6);
        assert_eq!(
            per_sensor,
            ["grid_power", "grid_energy_imported", "grid_energy_exported"]
        );
    }

    #[test]
    fn values_and_conversions() {
        let data = snapshot();
        assert_eq!(
            entity("ems", Target::Aggregate).value(&data),
            Some(SensorValue::Text("idle".to_string()))
        );
        assert_eq!(
            entity("energy_produced", Target::Aggregate).value(&data),
            Some(SensorValue::Number(1.5))
        );
        assert_eq!(
            entity("total_soc", Target::Aggregate).value(&data),
            Some(SensorValue::Number(75.5))
        );
        assert_eq!(entity("ems_error", Target::Aggregate).value(&data), None);
        assert_eq!(
            entity("battery_soc", Target::Ems(0)).value(&data),
            Some(SensorValue::Number(96.0))
        );
        assert_eq!(
            entity("device_error", Target::Ems(0)).value(&data),
            Some(SensorValue::Text("over temperature".to_string()))
        );
        assert_eq!(entity("device_power", Target::Ems(5)).value(&data), None);
        assert_eq!(
            entity("grid_energy_imported", Target::Sensor(0)).value(&data),
            Some(SensorValue::Number(2000.0))
        );
    }

    #[test]
    fn long_error_truncated() {
        let mut data = snapshot();
        data.aggregated.error_str = "x".repeat(400);
        let value = entity("ems_error", Target::Aggregate).value(&data);
        let Some(SensorValue::Text(text)) = value else {
            panic!("expected text");
        };
        assert_eq!(text.len(), MAX_STATE_LEN);
    }

    #[test]
    fn icons() {
        let data = snapshot();
        assert_eq!(entity("ems", Target::Aggregate).icon(&data).as_deref(), Some("mdi:battery-50"));
        assert_eq!(
            entity("device_status", Target::Ems(0)).icon(&data).as_deref(),
            Some("mdi:battery-100")
        );
        assert_eq!(battery_icon(3.0), "mdi:battery-outline");
        assert_eq!(battery_icon(14.0), "mdi:battery-10");
        assert_eq!(battery_icon(45.0), "mdi:battery-40");
        assert_eq!(battery_icon(55.0), "mdi:battery-60");
        assert_eq!(battery_icon(100.0), "mdi:battery-100");
        assert_eq!(
            entity("power", Target::Aggregate).icon(&data).as_deref(),
            Some("mdi:battery-sync-outline")
        );
    }

    #[test]
    fn sensor_entities_read_first_available_sensor() {
        let data = HomevoltData::from_json(&json!({"sensors": [
            {"euid": "offline", "type": "solar", "available": false, "total_power": 1.0},
            {"euid": "online", "type": "solar", "total_power": 900.0}
        ]}))
        .unwrap();

        let power = build_entities(&data)
            .into_iter()
            .find(|e| e.description.key == "solar_power")
            .unwrap();
        assert_eq!(power.target, Target::Sensor(1));
        assert_eq!(power.value(&data), Some(SensorValue::Number(900.0)));
        assert_eq!(power.unique_id(&data, "hv"), "homevolt_local_solar_power_sensor_online");
    }

    #[test]
    fn current_schedule_window() {
        let data = snapshot();
        let inside = Utc.with_ymd_and_hms(2025, 8, 23, 23, 15, 0).unwrap();
        let at_end = Utc.with_ymd_and_hms(2025, 8, 23, 23, 30, 0).unwrap();
        assert_eq!(current_schedule_at(&data, inside), "Idle schedule");
        assert_eq!(current_schedule_at(&data, at_end), NO_ACTIVE_SCHEDULE);
        assert_eq!(current_schedule_at(&HomevoltData::default(), inside), NO_ACTIVE_SCHEDULE);
    }

    #[test]
    fn attributes() {
        let data = snapshot();
        let attrs = entity("current_schedule", Target::Aggregate).attributes(&data);
        assert_eq!(attrs["schedules"][0]["type"], "Idle schedule");
        let attrs = entity("device_error", Target::Ems(0)).attributes(&data);
        assert_eq!(attrs["error_str"], "over temperature");
        let attrs = entity("grid_power", Target::Sensor(0)).attributes(&data);
        assert_eq!(attrs["phase"][0]["voltage"], 230.0);
    }

    #[test]
    fn unique_ids_and_devices() {
        let data = snapshot();
        let host = "http://192.168.1.100";
        assert_eq!(
            entity("device_power", Target::Ems(0)).unique_id(&data, host),
            "homevolt_local_device_power_ems_987654"
        );
        assert_eq!(
            entity("grid_power", Target::Sensor(0)).unique_id(&data, host),
            "homevolt_local_grid_power_sensor_g1"
        );
        assert_eq!(
            entity("power", Target::Aggregate).unique_id(&data, host),
            "homevolt_local_power_192.168.1.100"
        );

        let ems = entity("device_power", Target::Ems(0)).device_info(&data, host);
        assert_eq!(ems.identifier, "ems_987654");
        assert_eq!(ems.model, "Energy Management System 1.0.0");
        assert_eq!(ems.via_device.as_deref(), Some("homevolt_192.168.1.100"));

        let sensor = entity("grid_power", Target::Sensor(0)).device_info(&data, host);
        assert_eq!(sensor.name, "Homevolt Grid");
        assert_eq!(sensor.model, "Grid Sensor (Node 3)");
    }

    #[test]
    fn host_labels() {
        assert_eq!(host_label("http://192.168.1.100/ems.json"), "192.168.1.100");
        assert_eq!(host_label("hv.local"), "hv.local");
    }
}
