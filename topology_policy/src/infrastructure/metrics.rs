// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics (§4.11)
//!
//! Prometheus counters/gauges for placement outcomes, mirroring the
//! teacher's `MetricsService` shape: one registry, one struct field per
//! metric, namespaced under `topology_policy`.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use topology_policy_domain::error::{PlacementError, Result};

#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    allocations_total: IntCounter,
    allocation_failures_total: IntCounterVec,
    releases_total: IntCounter,
    rebalances_total: IntCounter,
    rebalance_duration_seconds: Histogram,
    active_grants: IntGauge,
    cold_starts_in_flight: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let allocations_total = IntCounter::with_opts(
            Opts::new("allocations_total", "Total successful resource allocations").namespace("topology_policy"),
        )
        .map_err(metrics_error)?;
        let allocation_failures_total = IntCounterVec::new(
            Opts::new("allocation_failures_total", "Total failed allocation attempts, by failure kind")
                .namespace("topology_policy"),
            &["kind"],
        )
        .map_err(metrics_error)?;
        let releases_total = IntCounter::with_opts(
            Opts::new("releases_total", "Total resource releases").namespace("topology_policy"),
        )
        .map_err(metrics_error)?;
        let rebalances_total = IntCounter::with_opts(
            Opts::new("rebalances_total", "Total rebalance passes that moved a grant").namespace("topology_policy"),
        )
        .map_err(metrics_error)?;
        let rebalance_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("rebalance_duration_seconds", "Time spent in a rebalance pass")
                .namespace("topology_policy"),
        )
        .map_err(metrics_error)?;
        let active_grants = IntGauge::with_opts(
            Opts::new("active_grants", "Currently held grants").namespace("topology_policy"),
        )
        .map_err(metrics_error)?;
        let cold_starts_in_flight = IntGauge::with_opts(
            Opts::new("cold_starts_in_flight", "Grants currently narrowed to PMEM awaiting ColdStartDone")
                .namespace("topology_policy"),
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(allocations_total.clone())).map_err(metrics_error)?;
        registry
            .register(Box::new(allocation_failures_total.clone()))
            .map_err(metrics_error)?;
        registry.register(Box::new(releases_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(rebalances_total.clone())).map_err(metrics_error)?;
        registry
            .register(Box::new(rebalance_duration_seconds.clone()))
            .map_err(metrics_error)?;
        registry.register(Box::new(active_grants.clone())).map_err(metrics_error)?;
        registry.register(Box::new(cold_starts_in_flight.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            allocations_total,
            allocation_failures_total,
            releases_total,
            rebalances_total,
            rebalance_duration_seconds,
            active_grants,
            cold_starts_in_flight,
        })
    }

    pub fn record_allocation(&self) {
        self.allocations_total.inc();
        self.active_grants.inc();
    }

    pub fn record_allocation_failure(&self, kind: &str) {
        self.allocation_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn record_release(&self) {
        self.releases_total.inc();
        self.active_grants.dec();
    }

    pub fn record_rebalance(&self, duration: std::time::Duration) {
        self.rebalances_total.inc();
        self.rebalance_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn cold_start_began(&self) {
        self.cold_starts_in_flight.inc();
    }

    pub fn cold_start_ended(&self) {
        self.cold_starts_in_flight.dec();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn metrics_error(e: impl std::fmt::Display) -> PlacementError {
    PlacementError::ConfigurationInvalid(format!("metrics registration failed: {e}"))
}
