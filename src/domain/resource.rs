//! Resource headroom for one sampling tick.

use std::fmt;

use tracing::{debug, warn};

use super::numeric::round_to;
use super::stats::RunStatistics;

/// Packet memory units treated as full.
pub const PKT_MEMORY_THRESHOLD: f64 = 2500.0;
/// Time to first byte treated as the acceptable limit.
pub const TTFB_THRESHOLD: f64 = 100.0;
/// Line rate may be exceeded by this factor before bandwidth reads exhausted.
pub const SPEED_CAPACITY_ADJUST: f64 = 1.2;

/// A headroom metric the snapshot can report as scarcest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    ClientCpu,
    ServerCpu,
    ClientPktMem,
    ServerPktMem,
    Ttfb,
    Bandwidth,
    ClientMemory,
    ServerMemory,
}

impl Resource {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ClientCpu => "Client CPU",
            Self::ServerCpu => "Server CPU",
            Self::ClientPktMem => "Client Pkt Mem",
            Self::ServerPktMem => "Server Pkt Mem",
            Self::Ttfb => "TTFB",
            Self::Bandwidth => "BW",
            Self::ClientMemory => "Client Memory",
            Self::ServerMemory => "Server Memory",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which headroom metrics take part in choosing the scarcest resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// Open-connection tests with a per-connection load: memory only.
    MemoryOnly,
    /// CPU, packet memory, TTFB and bandwidth; memory joins once
    /// `include_memory` is set.
    Full { include_memory: bool },
}

/// Percent headroom (100 − usage) of every tracked resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub client_cpu: f64,
    pub server_cpu: f64,
    pub client_memory: f64,
    pub server_memory: f64,
    pub client_pkt_mem: f64,
    pub server_pkt_mem: f64,
    pub ttfb: f64,
    /// `None` when the queue speed is unknown.
    pub bandwidth: Option<f64>,
}

impl ResourceSnapshot {
    /// Derive headroom from one tick of statistics. `queue_speed` is the
    /// summed client port speed in Mbps.
    #[must_use]
    pub fn from_stats(stats: &RunStatistics, queue_speed: f64) -> Self {
        let headroom = |usage: f64| round_to(100.0 - usage, 2);
        let bandwidth = (queue_speed > 0.0).then(|| {
            round_to(
                100.0 * (queue_speed * SPEED_CAPACITY_ADJUST - stats.total_bandwidth / 1000.0)
                    / queue_speed,
                2,
            )
        });
        Self {
            client_cpu: headroom(stats.client.cpu_utilized),
            server_cpu: headroom(stats.server.cpu_utilized),
            client_memory: headroom(stats.client_mem_pct_used),
            server_memory: headroom(stats.server_mem_pct_used),
            client_pkt_mem: headroom(stats.client.packet_memory_used * 100.0 / PKT_MEMORY_THRESHOLD),
            server_pkt_mem: headroom(stats.server.packet_memory_used * 100.0 / PKT_MEMORY_THRESHOLD),
            ttfb: headroom(stats.client.avg_ttfb * 100.0 / TTFB_THRESHOLD),
            bandwidth,
        }
    }

    /// Metrics considered under `scope`, in evaluation order.
    #[must_use]
    pub fn considered(&self, scope: ResourceScope) -> Vec<(Resource, f64)> {
        let memory = [
            (Resource::ClientMemory, self.client_memory),
            (Resource::ServerMemory, self.server_memory),
        ];
        match scope {
            ResourceScope::MemoryOnly => memory.to_vec(),
            ResourceScope::Full { include_memory } => {
                let mut metrics = vec![
                    (Resource::ClientCpu, self.client_cpu),
                    (Resource::ServerCpu, self.server_cpu),
                    (Resource::ClientPktMem, self.client_pkt_mem),
                    (Resource::ServerPktMem, self.server_pkt_mem),
                    (Resource::Ttfb, self.ttfb),
                ];
                if let Some(bandwidth) = self.bandwidth {
                    metrics.push((Resource::Bandwidth, bandwidth));
                }
                if include_memory {
                    metrics.extend(memory);
                }
                metrics
            }
        }
    }

    /// The scarcest considered resource and its headroom. On ties the last
    /// metric in evaluation order wins.
    ///
    /// Exhausted (< 1%) and exceeded (< 0%) resources are logged but do not
    /// stop anything by themselves.
    #[must_use]
    pub fn lowest(&self, scope: ResourceScope) -> (Resource, f64) {
        let mut lowest = (Resource::ClientMemory, f64::INFINITY);
        for (resource, value) in self.considered(scope) {
            if value <= lowest.1 {
                lowest = (resource, value);
            }
        }

        let (resource, value) = lowest;
        debug!(resource = %resource, available = value, "Lowest available resource");
        if value < 0.0 {
            warn!(resource = %resource, available = value, "Resource spike detected");
        } else if value < 1.0 {
            warn!(
                resource = %resource,
                available = value,
                client_cpu = self.client_cpu,
                server_cpu = self.server_cpu,
                client_memory = self.client_memory,
                server_memory = self.server_memory,
                client_pkt_mem = self.client_pkt_mem,
                server_pkt_mem = self.server_pkt_mem,
                ttfb = self.ttfb,
                "Resource exhausted or close to exhausted"
            );
        }
        lowest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_snapshot() -> ResourceSnapshot {
        ResourceSnapshot::from_stats(&RunStatistics::default(), 1000.0)
    }

    #[test]
    fn idle_run_has_full_headroom_except_bandwidth_margin() {
        let snapshot = idle_snapshot();
        assert_eq!(snapshot.client_cpu, 100.0);
        assert_eq!(snapshot.ttfb, 100.0);
        assert_eq!(snapshot.bandwidth, Some(120.0));
    }

    #[test]
    fn usage_is_normalised_against_thresholds() {
        let mut stats = RunStatistics::default();
        stats.client.packet_memory_used = 1250.0;
        stats.client.avg_ttfb = 25.0;
        stats.server.cpu_utilized = 70.5;
        stats.total_bandwidth = 900_000.0;

        let snapshot = ResourceSnapshot::from_stats(&stats, 1000.0);
        assert_eq!(snapshot.client_pkt_mem, 50.0);
        assert_eq!(snapshot.ttfb, 75.0);
        assert_eq!(snapshot.server_cpu, 29.5);
        assert_eq!(snapshot.bandwidth, Some(30.0));
    }

    #[test]
    fn zero_queue_speed_leaves_bandwidth_out() {
        let snapshot = ResourceSnapshot::from_stats(&RunStatistics::default(), 0.0);
        assert_eq!(snapshot.bandwidth, None);
        let considered = snapshot.considered(ResourceScope::Full {
            include_memory: false,
        });
        assert!(considered.iter().all(|(r, _)| *r != Resource::Bandwidth));
    }

    #[test]
    fn memory_joins_only_when_requested() {
        let snapshot = idle_snapshot();
        let early = snapshot.considered(ResourceScope::Full {
            include_memory: false,
        });
        let late = snapshot.considered(ResourceScope::Full {
            include_memory: true,
        });
        assert_eq!(early.len(), 6);
        assert_eq!(late.len(), 8);
    }

    #[test]
    fn memory_only_scope_picks_scarcer_memory() {
        let mut snapshot = idle_snapshot();
        snapshot.client_memory = 40.0;
        snapshot.server_memory = 35.0;
        snapshot.client_cpu = 1.0;

        let (resource, value) = snapshot.lowest(ResourceScope::MemoryOnly);
        assert_eq!(resource, Resource::ServerMemory);
        assert_eq!(value, 35.0);
    }

    #[test]
    fn ties_resolve_to_last_considered_metric() {
        let snapshot = idle_snapshot();
        let (resource, value) = snapshot.lowest(ResourceScope::Full {
            include_memory: true,
        });
        assert_eq!(value, 100.0);
        assert_eq!(resource, Resource::ServerMemory);
    }

    #[test]
    fn negative_headroom_is_reported_as_lowest() {
        let mut snapshot = idle_snapshot();
        snapshot.ttfb = -12.0;
        let (resource, value) = snapshot.lowest(ResourceScope::Full {
            include_memory: false,
        });
        assert_eq!(resource, Resource::Ttfb);
        assert_eq!(value, -12.0);
    }
}
