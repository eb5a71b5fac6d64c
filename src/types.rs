use std::fmt;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{trace, warn};

/// Euid reported by sensors the device synthesizes rather than addresses.
pub const VIRTUAL_SENSOR_EUID: &str = "0000000000000000";

/// Index of the per-device module in `bms_data`.
pub const BMS_DATA_INDEX_DEVICE: usize = 0;
/// Index of the system total in `bms_data`.
pub const BMS_DATA_INDEX_TOTAL: usize = 1;

/// EMS hardware identifier. Stable across IP address changes.
///
/// Production firmware reports an unsigned integer. Anything else that can
/// name a device (strings, negative or fractional numbers) is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum EcuId {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for EcuId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_u64() {
                Some(id) => Ok(EcuId::Number(id)),
                None => match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                        Ok(EcuId::Number(f as u64))
                    }
                    _ => Ok(EcuId::Text(n.to_string())),
                },
            },
            Value::String(s) => Ok(EcuId::Text(s)),
            other => Err(de::Error::custom(format!("invalid ecu_id: {other}"))),
        }
    }
}

impl fmt::Display for EcuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcuId::Number(n) => write!(f, "{n}"),
            EcuId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Grid,
    Solar,
    Load,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Grid, SensorKind::Solar, SensorKind::Load];

    pub fn as_homevolt_str(&self) -> &'static str {
        match self {
            SensorKind::Grid => "grid",
            SensorKind::Solar => "solar",
            SensorKind::Load => "load",
        }
    }

    pub fn from_homevolt_str(s: &str) -> Option<Self> {
        match s {
            "grid" => Some(SensorKind::Grid),
            "solar" => Some(SensorKind::Solar),
            "load" => Some(SensorKind::Load),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SensorKind::Grid => "Grid",
            SensorKind::Solar => "Solar",
            SensorKind::Load => "Load",
        }
    }
}

/// Field decoders that never fail a snapshot over one malformed value.
///
/// Firmware versions disagree on integer vs float encodings and send `null`
/// for fields they have not populated yet.
mod lenient {
    use super::*;

    /// A value that does not decode as `T` becomes `T::default()`.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(T::deserialize(&value).unwrap_or_else(|e| {
            trace!(error = %e, value = %value, "using default for malformed field");
            T::default()
        }))
    }

    /// Integers, floats (truncated) and numeric strings.
    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let n = match &value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        Ok(n.unwrap_or_default())
    }

    /// Only an explicit `false` counts.
    pub fn not_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(Value::deserialize(deserializer)? != Value::Bool(false))
    }

    /// Elements that fail to decode are dropped; a non-array is an empty list.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let Value::Array(items) = Value::deserialize(deserializer)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match T::deserialize(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(error = %e, "dropping malformed record");
                    None
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsInfo {
    #[serde(deserialize_with = "lenient::int")]
    pub protocol_version: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub fw_version: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rated_capacity: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rated_power: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BmsInfo {
    #[serde(deserialize_with = "lenient::or_default")]
    pub fw_version: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub serial_number: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rated_cap: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InvInfo {
    #[serde(deserialize_with = "lenient::or_default")]
    pub fw_version: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsConfig {
    #[serde(deserialize_with = "lenient::int")]
    pub grid_code_preset: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub grid_code_preset_str: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub control_timeout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InvConfig {
    #[serde(deserialize_with = "lenient::or_default")]
    pub ffr_fstart_freq: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsControl {
    #[serde(deserialize_with = "lenient::int")]
    pub mode_sel: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub pwr_ref: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub freq_res_mode: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub freq_res_pwr_fcr_n: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub freq_res_pwr_fcr_d_up: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub freq_res_pwr_fcr_d_down: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub freq_res_pwr_ref_ffr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub act_pwr_ch_lim: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub act_pwr_di_lim: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub react_pwr_pos_limit: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub react_pwr_neg_limit: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub freq_test_seq: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub data_usage: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub allow_dfu: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsData {
    #[serde(deserialize_with = "lenient::int")]
    pub timestamp_ms: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub state: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub state_str: String,
    #[serde(deserialize_with = "lenient::int")]
    pub info: i64,
    #[serde(deserialize_with = "lenient::list")]
    pub info_str: Vec<String>,
    #[serde(deserialize_with = "lenient::int")]
    pub warning: i64,
    #[serde(deserialize_with = "lenient::list")]
    pub warning_str: Vec<String>,
    #[serde(deserialize_with = "lenient::int")]
    pub alarm: i64,
    #[serde(deserialize_with = "lenient::list")]
    pub alarm_str: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub phase_angle: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub frequency: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub phase_seq: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub power: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub apparent_power: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub reactive_power: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub energy_produced: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub energy_consumed: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub sys_temp: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_cap: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub freq_res_state: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub soc_avg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BmsData {
    #[serde(deserialize_with = "lenient::or_default")]
    pub energy_avail: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub cycle_count: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub soc: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub state: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub state_str: String,
    #[serde(deserialize_with = "lenient::int")]
    pub alarm: i64,
    #[serde(deserialize_with = "lenient::list")]
    pub alarm_str: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub tmin: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub tmax: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsPrediction {
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_ch_pwr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_di_pwr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_ch_energy: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_di_energy: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_inv_ch_pwr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_inv_di_pwr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_group_fuse_ch_pwr: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub avail_group_fuse_di_pwr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsVoltage {
    #[serde(deserialize_with = "lenient::or_default")]
    pub l1: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l2: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l3: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l1_l2: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l2_l3: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l3_l1: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsCurrent {
    #[serde(deserialize_with = "lenient::or_default")]
    pub l1: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l2: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub l3: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsAggregate {
    #[serde(deserialize_with = "lenient::or_default")]
    pub imported_kwh: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub exported_kwh: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseData {
    #[serde(deserialize_with = "lenient::or_default")]
    pub voltage: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub amp: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub power: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub pf: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorData {
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub sensor_type: String,
    #[serde(deserialize_with = "lenient::int")]
    pub node_id: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub euid: String,
    #[serde(deserialize_with = "lenient::int")]
    pub interface: i64,
    #[serde(deserialize_with = "lenient::not_false")]
    pub available: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rssi: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub average_rssi: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub pdr: f64,
    #[serde(deserialize_with = "lenient::list")]
    pub phase: Vec<PhaseData>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub frequency: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub total_power: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub energy_imported: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub energy_exported: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub timestamp: i64,
}

impl Default for SensorData {
    fn default() -> Self {
        Self {
            sensor_type: String::new(),
            node_id: 0,
            euid: String::new(),
            interface: 0,
            available: true,
            rssi: 0.0,
            average_rssi: 0.0,
            pdr: 0.0,
            phase: Vec::new(),
            frequency: 0.0,
            total_power: 0.0,
            energy_imported: 0.0,
            energy_exported: 0.0,
            timestamp: 0,
        }
    }
}

impl SensorData {
    pub fn kind(&self) -> Option<SensorKind> {
        SensorKind::from_homevolt_str(&self.sensor_type)
    }

    pub fn is_virtual(&self) -> bool {
        self.euid == VIRTUAL_SENSOR_EUID
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmsDevice {
    #[serde(deserialize_with = "lenient::or_default")]
    pub ecu_id: Option<EcuId>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ecu_host: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ecu_version: String,
    #[serde(deserialize_with = "lenient::int")]
    pub error: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub error_str: String,
    #[serde(deserialize_with = "lenient::int")]
    pub op_state: i64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub op_state_str: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_info: EmsInfo,
    #[serde(deserialize_with = "lenient::list")]
    pub bms_info: Vec<BmsInfo>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub inv_info: InvInfo,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_config: EmsConfig,
    #[serde(deserialize_with = "lenient::or_default")]
    pub inv_config: InvConfig,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_control: EmsControl,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_data: EmsData,
    #[serde(deserialize_with = "lenient::list")]
    pub bms_data: Vec<BmsData>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_prediction: EmsPrediction,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_voltage: EmsVoltage,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_current: EmsCurrent,
    #[serde(deserialize_with = "lenient::or_default")]
    pub ems_aggregate: EmsAggregate,
    #[serde(deserialize_with = "lenient::int")]
    pub error_cnt: i64,
}

/// One entry of the device's `sched_list` console output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub schedule_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub setpoint: Option<i64>,
    /// Raw setpoint text when the device reported a sentinel like `<max allowed>`.
    pub setpoint_raw: Option<String>,
    pub offline: Option<bool>,
    pub max_discharge: Option<String>,
    pub max_charge: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schedule {
    pub entries: Vec<ScheduleEntry>,
    pub count: u32,
    pub current_id: Option<String>,
}

/// Merged view over every configured host, plus the latest schedule listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HomevoltData {
    #[serde(rename = "$type", deserialize_with = "lenient::or_default")]
    pub type_name: String,
    #[serde(deserialize_with = "lenient::int")]
    pub ts: i64,
    #[serde(deserialize_with = "lenient::list")]
    pub ems: Vec<EmsDevice>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub aggregated: EmsDevice,
    #[serde(deserialize_with = "lenient::list")]
    pub sensors: Vec<SensorData>,
    #[serde(skip)]
    pub schedules: Vec<ScheduleEntry>,
    #[serde(skip)]
    pub schedule_count: Option<u32>,
    #[serde(skip)]
    pub schedule_current_id: Option<String>,
}

impl HomevoltData {
    pub fn from_json(value: &serde_json::Value) -> crate::Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    pub fn with_schedule(mut self, schedule: &Schedule) -> Self {
        self.schedules = schedule.entries.clone();
        self.schedule_count = Some(schedule.count);
        self.schedule_current_id = schedule.current_id.clone();
        self
    }

    /// First sensor of the given kind that is not flagged unavailable.
    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorData> {
        self.sensors
            .iter()
            .find(|s| s.available && s.kind() == Some(kind))
    }
}
