use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use crate::fetch::{Fetcher, FetcherBuilder};
use crate::merge::{count, merge_snapshots, select_base, MergeBase, ATTR_EMS, ATTR_SENSORS};
use crate::protocol::{
    build_url, parse_schedule, CONSOLE_RESOURCE_PATH, EMS_RESOURCE_PATH, SCHEDULE_LIST_COMMAND,
};
use crate::types::*;
use crate::{Error, Result};

/// Fetch the schedule listing on the first cycle and every Nth one after.
pub const SCHEDULE_FETCH_INTERVAL: u64 = 4;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

type UpdateCallback = Box<dyn Fn(&HomevoltData) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

/// A configured device: the host key used for merging and its `ems.json` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub host: String,
    pub url: String,
}

impl Resource {
    pub fn for_host(host: impl Into<String>) -> Self {
        let host = host.into();
        let url = build_url(&host, EMS_RESOURCE_PATH);
        Self { host, url }
    }
}

pub struct CoordinatorBuilder {
    resources: Vec<Resource>,
    main_host: Option<String>,
    entry_id: String,
    ecu_id: Option<EcuId>,
    scan_interval: Duration,
    schedule_fetch_interval: u64,
    fetcher: FetcherBuilder,
    update_callbacks: Vec<UpdateCallback>,
    error_callbacks: Vec<ErrorCallback>,
}

impl CoordinatorBuilder {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            resources: Vec::new(),
            main_host: None,
            entry_id: entry_id.into(),
            ecu_id: None,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            schedule_fetch_interval: SCHEDULE_FETCH_INTERVAL,
            fetcher: FetcherBuilder::new(),
            update_callbacks: Vec::new(),
            error_callbacks: Vec::new(),
        }
    }

    /// Add a host polled at `<host>/ems.json`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.resources.push(Resource::for_host(host));
        self
    }

    /// Add a host whose snapshot lives at an explicit URL.
    pub fn resource(mut self, host: impl Into<String>, url: impl Into<String>) -> Self {
        self.resources.push(Resource {
            host: host.into(),
            url: url.into(),
        });
        self
    }

    /// Host whose aggregate fields are published. Defaults to the first host.
    pub fn main_host(mut self, host: impl Into<String>) -> Self {
        self.main_host = Some(host.into());
        self
    }

    pub fn ecu_id(mut self, id: EcuId) -> Self {
        self.ecu_id = Some(id);
        self
    }

    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn schedule_fetch_interval(mut self, every: u64) -> Self {
        self.schedule_fetch_interval = every.max(1);
        self
    }

    pub fn fetcher(mut self, f: impl FnOnce(FetcherBuilder) -> FetcherBuilder) -> Self {
        self.fetcher = f(self.fetcher);
        self
    }

    pub fn on_update(mut self, f: impl Fn(&HomevoltData) + Send + Sync + 'static) -> Self {
        self.update_callbacks.push(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.error_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let main_host = self
            .main_host
            .or_else(|| self.resources.first().map(|r| r.host.clone()))
            .unwrap_or_default();

        Ok(Coordinator {
            fetcher: self.fetcher.build()?,
            resources: self.resources,
            main_host,
            entry_id: self.entry_id,
            ecu_id: self.ecu_id,
            scan_interval: self.scan_interval,
            schedule_fetch_interval: self.schedule_fetch_interval,
            update_count: 0,
            first_refresh_done: false,
            cached_schedule: Schedule::default(),
            data: None,
            update_callbacks: self.update_callbacks,
            error_callbacks: self.error_callbacks,
        })
    }
}

/// Polls every configured host, merges their snapshots and publishes the result.
///
/// One coordinator per installation. `refresh` takes `&mut self`, so a
/// coordinator never has two cycles in flight.
pub struct Coordinator {
    fetcher: Fetcher,
    resources: Vec<Resource>,
    main_host: String,
    entry_id: String,
    ecu_id: Option<EcuId>,
    scan_interval: Duration,
    schedule_fetch_interval: u64,
    update_count: u64,
    first_refresh_done: bool,
    cached_schedule: Schedule,
    data: Option<Arc<HomevoltData>>,
    update_callbacks: Vec<UpdateCallback>,
    error_callbacks: Vec<ErrorCallback>,
}

impl Coordinator {
    pub fn builder(entry_id: impl Into<String>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(entry_id)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn main_host(&self) -> &str {
        &self.main_host
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Last successfully published snapshot.
    pub fn data(&self) -> Option<Arc<HomevoltData>> {
        self.data.clone()
    }

    pub fn cached_schedule(&self) -> &Schedule {
        &self.cached_schedule
    }

    /// Stable identifier for the installation, independent of IP addresses.
    pub fn main_device_id(&self) -> String {
        if let Some(id) = &self.ecu_id {
            return id.to_string();
        }
        if let Some(id) = self
            .data
            .as_ref()
            .and_then(|d| d.ems.first())
            .and_then(|ems| ems.ecu_id.as_ref())
        {
            return id.to_string();
        }
        self.entry_id.clone()
    }

    /// Run one update cycle and publish its snapshot.
    pub async fn refresh(&mut self) -> Result<Arc<HomevoltData>> {
        if self.resources.is_empty() {
            return Err(Error::NoResources);
        }

        let results = self.fetch_all_ems_data().await;
        if results.is_empty() {
            return Err(Error::AllHostsFailed);
        }

        self.update_count += 1;
        let schedule = self.schedule_with_cache().await;

        let verbose = !self.first_refresh_done || results.len() > 1;
        let Some(base) = select_base(&results, &self.main_host) else {
            return Err(Error::AllHostsFailed);
        };

        if verbose {
            self.log_cycle(&results, &schedule, &base);
        }

        let merged = merge_snapshots(&results, &base, verbose);
        let data = Arc::new(HomevoltData::from_json(&merged)?.with_schedule(&schedule));

        self.first_refresh_done = true;
        self.data = Some(data.clone());
        for cb in &self.update_callbacks {
            cb(&data);
        }
        Ok(data)
    }

    /// Refresh on the scan interval until `shutdown` resolves.
    ///
    /// Failed cycles are logged and reported to `on_error` callbacks; the last
    /// good snapshot stays published. Dropping an in-flight cycle abandons
    /// its requests.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            hosts = self.resources.len(),
            main_host = %self.main_host,
            interval_s = self.scan_interval.as_secs(),
            "starting update loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = self.refresh() => result,
            };

            if let Err(e) = result {
                error!(error = %e, "update failed");
                for cb in &self.error_callbacks {
                    cb(&e);
                }
            }
        }

        debug!("update loop stopped");
    }

    /// Send an administrative console command (e.g. `sched_add ...`) to the main host.
    pub async fn send_console_command(&self, cmd: &str) -> Result<String> {
        let url = build_url(&self.main_host, CONSOLE_RESOURCE_PATH);
        self.fetcher.console(&url, cmd).await
    }

    async fn fetch_all_ems_data(&self) -> Vec<(String, Value)> {
        let fetches = self.resources.iter().map(|resource| async move {
            let result = self.fetcher.fetch_snapshot(&resource.url).await;
            (resource, result)
        });

        let mut valid = Vec::new();
        for (resource, result) in join_all(fetches).await {
            match result {
                Ok(body) => valid.push((resource.host.clone(), body)),
                Err(e) => {
                    error!(url = %resource.url, error = %e, "error fetching data");
                }
            }
        }
        valid
    }

    async fn schedule_with_cache(&mut self) -> Schedule {
        let should_fetch =
            self.update_count == 1 || self.update_count % self.schedule_fetch_interval == 0;
        if !should_fetch {
            trace!(cycle = self.update_count, "using cached schedule data");
            return self.cached_schedule.clone();
        }

        let url = build_url(&self.main_host, CONSOLE_RESOURCE_PATH);
        match self.fetcher.console(&url, SCHEDULE_LIST_COMMAND).await {
            Ok(text) => {
                self.cached_schedule = parse_schedule(&text);
            }
            Err(e) => {
                error!(url = %url, error = %e, "error fetching schedule data");
            }
        }
        self.cached_schedule.clone()
    }

    fn log_cycle(&self, results: &[(String, Value)], schedule: &Schedule, base: &MergeBase) {
        debug!(
            count = schedule.count,
            current_id = ?schedule.current_id,
            entries = schedule.entries.len(),
            "schedule data"
        );
        let hosts: Vec<&str> = results.iter().map(|(host, _)| host.as_str()).collect();
        debug!(
            hosts = ?hosts,
            main_host = %self.main_host,
            "valid results from {} hosts",
            results.len()
        );
        let base_data = &results[base.index].1;
        debug!(
            host = %base.host,
            ems = count(base_data, ATTR_EMS),
            sensors = count(base_data, ATTR_SENSORS),
            "using main data"
        );
    }
}
