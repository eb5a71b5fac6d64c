use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const ATTR_EMS: &str = "ems";
pub const ATTR_SENSORS: &str = "sensors";
pub const ATTR_ECU_ID: &str = "ecu_id";
pub const ATTR_EUID: &str = "euid";
pub const ATTR_TYPE: &str = "type";

/// Which fetched snapshot supplies the aggregate fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeBase {
    pub index: usize,
    pub host: String,
    /// True when the main host was missing and another host stood in.
    pub substituted: bool,
}

/// Pick the main host's snapshot, falling back to the first fetched one.
///
/// Returns `None` only for an empty result set.
pub fn select_base(results: &[(String, Value)], main_host: &str) -> Option<MergeBase> {
    if let Some(index) = results.iter().position(|(host, _)| host == main_host) {
        return Some(MergeBase {
            index,
            host: main_host.to_string(),
            substituted: false,
        });
    }

    let (fallback, _) = results.first()?;
    let fetched: Vec<&str> = results.iter().map(|(host, _)| host.as_str()).collect();
    warn!(
        main_host,
        fetched = ?fetched,
        substitute = %fallback,
        "main system data not available, using first valid result"
    );
    Some(MergeBase {
        index: 0,
        host: fallback.clone(),
        substituted: true,
    })
}

/// Merge per-host snapshots into one.
///
/// Everything except the `ems` and `sensors` lists comes verbatim from the
/// base host. The lists are the base host's, followed by entries from the
/// other hosts that are not already present. The base host is skipped by its
/// key so its entries are never counted twice.
pub fn merge_snapshots(results: &[(String, Value)], base: &MergeBase, verbose: bool) -> Value {
    let mut merged = match results.get(base.index).map(|(_, data)| data) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let mut all_ems = Vec::new();
    let mut all_sensors = Vec::new();
    if let Some((_, data)) = results.get(base.index) {
        absorb(&mut all_ems, &mut all_sensors, data);
    }

    if verbose {
        debug!(
            skip_host = %base.host,
            ems = all_ems.len(),
            sensors = all_sensors.len(),
            "merge starting"
        );
    }

    for (host, data) in results {
        if *host == base.host {
            if verbose {
                debug!(%host, "skipping host (main data source)");
            }
            continue;
        }

        if verbose {
            debug!(
                %host,
                ems = count(data, ATTR_EMS),
                sensors = count(data, ATTR_SENSORS),
                "processing host"
            );
        }

        absorb(&mut all_ems, &mut all_sensors, data);
    }

    if verbose {
        let summary: Vec<String> = all_sensors
            .iter()
            .map(|s| {
                format!(
                    "{}:{}",
                    s.get(ATTR_TYPE).and_then(Value::as_str).unwrap_or("none"),
                    s.get(ATTR_EUID).and_then(Value::as_str).unwrap_or("no-euid"),
                )
            })
            .collect();
        debug!(
            ems = all_ems.len(),
            sensors = all_sensors.len(),
            merged = ?summary,
            "merge complete"
        );
    }

    merged.insert(ATTR_EMS.to_string(), Value::Array(all_ems));
    merged.insert(ATTR_SENSORS.to_string(), Value::Array(all_sensors));
    Value::Object(merged)
}

/// Append the host's devices and sensors that the accumulators lack.
fn absorb(all_ems: &mut Vec<Value>, all_sensors: &mut Vec<Value>, data: &Value) {
    let ems = data.get(ATTR_EMS).and_then(Value::as_array);
    for device in ems.into_iter().flatten() {
        if !contains_ems(all_ems, device) {
            all_ems.push(device.clone());
        }
    }

    let sensors = data.get(ATTR_SENSORS).and_then(Value::as_array);
    for sensor in sensors.into_iter().flatten() {
        if !contains_sensor(all_sensors, sensor) {
            all_sensors.push(sensor.clone());
        }
    }
}

pub(crate) fn count(data: &Value, key: &str) -> usize {
    data.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

/// A present, non-null, non-empty identifier field.
fn key_of<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        v => Some(v),
    }
}

/// EMS devices are the same device when their `ecu_id` matches. Devices
/// without one are never considered present.
fn contains_ems(acc: &[Value], device: &Value) -> bool {
    let Some(ecu_id) = key_of(device, ATTR_ECU_ID) else {
        return false;
    };
    acc.iter().any(|e| e.get(ATTR_ECU_ID) == Some(ecu_id))
}

/// Sensors match on `(euid, type)`; virtual sensors share an all-zero euid
/// so the euid alone is not enough. Without a type only the euid is
/// compared, and sensors without an euid are never considered present.
fn contains_sensor(acc: &[Value], sensor: &Value) -> bool {
    let Some(euid) = key_of(sensor, ATTR_EUID) else {
        return false;
    };
    match key_of(sensor, ATTR_TYPE) {
        Some(sensor_type) => acc.iter().any(|s| {
            s.get(ATTR_EUID) == Some(euid) && s.get(ATTR_TYPE) == Some(sensor_type)
        }),
        None => acc.iter().any(|s| s.get(ATTR_EUID) == Some(euid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VIRTUAL_SENSOR_EUID;
    use serde_json::json;

    const HOST_A: &str = "http://192.168.1.100";
    const HOST_B: &str = "http://192.168.1.101";

    fn snapshot(ecu_id: Value, power: f64, sensors: Value) -> Value {
        json!({
            "aggregated": {"ems_data": {"power": power}},
            "ems": [{"ecu_id": ecu_id, "ems_data": {"power": power}}],
            "sensors": sensors,
        })
    }

    fn default_sensors() -> Value {
        json!([
            {"euid": "sensor_grid_001", "type": "grid", "total_power": 100.0},
            {"euid": "sensor_solar_001", "type": "solar", "total_power": 500.0},
            {"euid": VIRTUAL_SENSOR_EUID, "type": "load", "total_power": 200.0},
        ])
    }

    fn merge(results: &[(String, Value)], main: &str) -> (MergeBase, Value) {
        let base = select_base(results, main).unwrap();
        let merged = merge_snapshots(results, &base, true);
        (base, merged)
    }

    fn len(v: &Value, key: &str) -> usize {
        v[key].as_array().unwrap().len()
    }

    #[test]
    fn single_host_is_unchanged() {
        let results = vec![(HOST_A.to_string(), snapshot(json!(1), 100.0, default_sensors()))];
        let (base, merged) = merge(&results, HOST_A);
        assert!(!base.substituted);
        assert_eq!(merged, results[0].1);
    }

    #[test]
    fn identical_sensor_on_two_hosts_appears_once() {
        let sensor = json!([{"euid": "abc", "type": "grid"}]);
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(1), 1.0, sensor.clone())),
            (HOST_B.to_string(), snapshot(json!(2), 2.0, sensor)),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "sensors"), 1);
        assert_eq!(len(&merged, "ems"), 2);
    }

    #[test]
    fn virtual_sensors_split_by_type() {
        let a = json!([{"euid": VIRTUAL_SENSOR_EUID, "type": "load"}]);
        let b = json!([
            {"euid": VIRTUAL_SENSOR_EUID, "type": "load"},
            {"euid": VIRTUAL_SENSOR_EUID, "type": "solar"},
        ]);
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(1), 1.0, a)),
            (HOST_B.to_string(), snapshot(json!(2), 2.0, b)),
        ];
        let (_, merged) = merge(&results, HOST_A);
        let types: Vec<&str> = merged["sensors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, ["load", "solar"]);
    }

    #[test]
    fn sensor_without_type_dedups_on_euid() {
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(1), 1.0, json!([{"euid": "x", "type": "grid"}]))),
            (HOST_B.to_string(), snapshot(json!(2), 2.0, json!([{"euid": "x"}]))),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "sensors"), 1);
    }

    #[test]
    fn sensors_without_euid_always_added() {
        let anon = json!([{"type": "grid"}, {"type": "grid"}]);
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(1), 1.0, anon.clone())),
            (HOST_B.to_string(), snapshot(json!(2), 2.0, anon)),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "sensors"), 4);
    }

    #[test]
    fn duplicates_within_one_secondary_host_collapse() {
        let dupes = json!([{"euid": "d", "type": "solar"}, {"euid": "d", "type": "solar"}]);
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(1), 1.0, json!([]))),
            (HOST_B.to_string(), snapshot(json!(2), 2.0, dupes)),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "sensors"), 1);
    }

    #[test]
    fn duplicates_within_base_host_collapse() {
        let dupes = json!([{"euid": "d", "type": "grid"}, {"euid": "d", "type": "grid"}]);
        let results = vec![(HOST_A.to_string(), snapshot(json!(1), 1.0, dupes))];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "sensors"), 1);
    }

    #[test]
    fn ems_dedup_on_ecu_id() {
        let results = vec![
            (HOST_A.to_string(), snapshot(json!(42), 1.0, json!([]))),
            (HOST_B.to_string(), snapshot(json!(42), 2.0, json!([]))),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "ems"), 1);
        assert_eq!(merged["ems"][0]["ems_data"]["power"], 1.0);
    }

    #[test]
    fn ems_without_ecu_id_never_deduplicated() {
        let no_id = json!({"aggregated": {}, "ems": [{"ecu_host": "a"}, {"ecu_host": "a"}]});
        let results = vec![
            (HOST_A.to_string(), no_id.clone()),
            (HOST_B.to_string(), no_id),
        ];
        let (_, merged) = merge(&results, HOST_A);
        assert_eq!(len(&merged, "ems"), 4);
    }

    #[test]
    fn aggregate_comes_from_main_host_only() {
        let results = vec![
            (HOST_B.to_string(), snapshot(json!(2), 2.0, json!([]))),
            (HOST_A.to_string(), snapshot(json!(1), 1.0, json!([]))),
        ];
        let (base, merged) = merge(&results, HOST_A);
        assert_eq!(base.index, 1);
        assert_eq!(merged["aggregated"], results[1].1["aggregated"]);
    }

    #[test]
    fn missing_main_host_falls_back_to_first() {
        let results = vec![(HOST_B.to_string(), snapshot(json!(2), 2.0, default_sensors()))];
        let (base, merged) = merge(&results, HOST_A);
        assert!(base.substituted);
        assert_eq!(base.host, HOST_B);
        assert_eq!(merged["aggregated"], results[0].1["aggregated"]);
        assert_eq!(len(&merged, "ems"), 1);
        assert_eq!(len(&merged, "sensors"), 3);
    }

    #[test]
    fn fallback_base_is_skipped_by_host_key() {
        let results = vec![
            (HOST_B.to_string(), snapshot(json!(2), 2.0, default_sensors())),
            ("http://192.168.1.102".to_string(), snapshot(json!(3), 3.0, default_sensors())),
        ];
        let (base, merged) = merge(&results, HOST_A);
        assert!(base.substituted);
        assert_eq!(len(&merged, "sensors"), 3);
        assert_eq!(len(&merged, "ems"), 2);
    }

    #[test]
    fn empty_results_have_no_base() {
        assert!(select_base(&[], HOST_A).is_none());
    }
}
