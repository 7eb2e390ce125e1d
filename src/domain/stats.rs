//! Typed run statistics.
//!
//! The controller reports statistics as flat `{type, subType?, value}`
//! triples for the client and server side. They are grouped into per-type
//! maps and then mapped field by field onto [`ClientStats`] and
//! [`ServerStats`]. Absent counters read as zero and are listed in
//! [`RunStatistics::missing`]; the time counters stay optional so callers can
//! refuse to steer without them.

use std::collections::BTreeMap;

use super::error::DomainError;
use super::numeric::round_to;
use super::test_type::TestType;

/// One statistic as reported by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatistic {
    pub kind: String,
    pub sub_kind: Option<String>,
    pub value: f64,
}

impl RawStatistic {
    pub fn scalar(kind: impl Into<String>, value: f64) -> Self {
        Self {
            kind: kind.into(),
            sub_kind: None,
            value,
        }
    }

    pub fn nested(kind: impl Into<String>, sub_kind: impl Into<String>, value: f64) -> Self {
        Self {
            kind: kind.into(),
            sub_kind: Some(sub_kind.into()),
            value,
        }
    }
}

/// Client and server statistics for one sampling tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRunStatistics {
    pub client: Vec<RawStatistic>,
    pub server: Vec<RawStatistic>,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Scalar(f64),
    Map(BTreeMap<String, f64>),
}

/// Statistics of one side grouped by type.
#[derive(Debug, Clone, Default)]
struct Grouped {
    entries: BTreeMap<String, Entry>,
}

impl Grouped {
    fn from_raw(raw: &[RawStatistic]) -> Self {
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        for stat in raw {
            match &stat.sub_kind {
                Some(sub) => {
                    let entry = entries
                        .entry(stat.kind.clone())
                        .or_insert_with(|| Entry::Map(BTreeMap::new()));
                    if let Entry::Scalar(_) = entry {
                        *entry = Entry::Map(BTreeMap::new());
                    }
                    if let Entry::Map(map) = entry {
                        map.insert(sub.clone(), stat.value);
                    }
                }
                None => {
                    entries.insert(stat.kind.clone(), Entry::Scalar(stat.value));
                }
            }
        }
        Self { entries }
    }

    fn nested(&self, kind: &str, sub: &str) -> Option<f64> {
        match self.entries.get(kind) {
            Some(Entry::Map(map)) => map.get(sub).copied(),
            _ => None,
        }
    }

    fn scalar(&self, kind: &str) -> Option<f64> {
        match self.entries.get(kind) {
            Some(Entry::Scalar(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Field reader that remembers which keys were absent.
struct Reader<'a> {
    side: &'static str,
    grouped: &'a Grouped,
    missing: &'a mut Vec<String>,
}

impl Reader<'_> {
    fn get(&mut self, kind: &str, sub: &str) -> f64 {
        self.grouped.nested(kind, sub).unwrap_or_else(|| {
            self.missing.push(format!("{}.{kind}.{sub}", self.side));
            0.0
        })
    }

    fn scalar(&mut self, kind: &str) -> Option<f64> {
        let value = self.grouped.scalar(kind);
        if value.is_none() {
            self.missing.push(format!("{}.{kind}", self.side));
        }
        value
    }
}

/// Client side counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    pub rx_bandwidth: f64,
    pub rx_packet_count: f64,
    pub rx_packet_rate: f64,
    pub tx_bandwidth: f64,
    pub tx_packet_count: f64,
    pub tx_packet_rate: f64,
    pub aborted_txns: f64,
    pub aborted_txns_per_sec: f64,
    pub attempted_txns: f64,
    pub attempted_txns_per_sec: f64,
    pub successful_txns: f64,
    pub successful_txns_per_sec: f64,
    pub unsuccessful_txns: f64,
    pub unsuccessful_txns_per_sec: f64,
    pub loadspec_avg_idle: f64,
    pub cpu_utilized: f64,
    pub memory_main_size: f64,
    pub memory_main_used: f64,
    pub packet_memory_used: f64,
    pub rcv_queue_length: f64,
    pub simusers_alive: f64,
    pub simusers_animating: f64,
    pub simusers_blocking: f64,
    pub simusers_sleeping: f64,
    pub current_load: f64,
    pub desired_load: f64,
    pub avg_ttfb: f64,
    pub avg_tt_synack: f64,
    pub cumulative_attempted_conns: f64,
    pub cumulative_established_conns: f64,
    pub url_avg_response_time: f64,
    pub attempted_conn_rate: f64,
    pub established_conn_rate: f64,
    pub attempted_conns: f64,
    pub established_conns: f64,
    pub time_elapsed: Option<f64>,
    pub time_remaining: Option<f64>,
}

impl ClientStats {
    fn read(r: &mut Reader<'_>, test_type: TestType) -> Self {
        let mut stats = Self {
            rx_bandwidth: r.get("driver", "rxBandwidth"),
            rx_packet_count: r.get("driver", "rxPacketCount"),
            rx_packet_rate: r.get("driver", "rxPacketRate"),
            tx_bandwidth: r.get("driver", "txBandwidth"),
            tx_packet_count: r.get("driver", "txPacketCount"),
            tx_packet_rate: r.get("driver", "txPacketRate"),
            aborted_txns: r.get("http", "abortedTxns"),
            aborted_txns_per_sec: r.get("http", "abortedTxnsPerSec"),
            attempted_txns: r.get("sum", "attemptedTxns"),
            attempted_txns_per_sec: r.get("sum", "attemptedTxnsPerSec"),
            successful_txns: r.get("sum", "successfulTxns"),
            successful_txns_per_sec: r.get("sum", "successfulTxnsPerSec"),
            unsuccessful_txns: r.get("sum", "unsuccessfulTxns"),
            unsuccessful_txns_per_sec: r.get("sum", "unsuccessfulTxnsPerSec"),
            loadspec_avg_idle: r.get("loadspec", "averageIdleTime"),
            cpu_utilized: round_to(r.get("loadspec", "cpuUtilized"), 1),
            memory_main_size: r.get("memory", "mainPoolSize"),
            memory_main_used: r.get("memory", "mainPoolUsed"),
            packet_memory_used: r.get("memory", "packetMemoryUsed"),
            rcv_queue_length: r.get("memory", "rcvQueueLength"),
            simusers_alive: r.get("simusers", "simUsersAlive"),
            simusers_animating: r.get("simusers", "simUsersAnimating"),
            simusers_blocking: r.get("simusers", "simUsersBlocking"),
            simusers_sleeping: r.get("simusers", "simUsersSleeping"),
            current_load: r.get("sum", "currentLoadSpecCount"),
            desired_load: r.get("sum", "desiredLoadSpecCount"),
            avg_ttfb: round_to(r.get("tcp", "averageTimeToFirstByte"), 1),
            avg_tt_synack: round_to(r.get("tcp", "averageTimeToSynAck"), 1),
            cumulative_attempted_conns: r.get("tcp", "cummulativeAttemptedConns"),
            cumulative_established_conns: r.get("tcp", "cummulativeEstablishedConns"),
            url_avg_response_time: round_to(r.get("url", "averageRespTimePerUrl"), 1),
            attempted_conn_rate: r.get("sum", "attemptedConnRate"),
            established_conn_rate: r.get("sum", "establishedConnRate"),
            attempted_conns: r.get("sum", "attemptedConns"),
            established_conns: r.get("sum", "currentEstablishedConns"),
            time_elapsed: r.scalar("timeElapsed"),
            time_remaining: r.scalar("timeRemaining"),
        };

        if matches!(test_type, TestType::MaxCps | TestType::MaxTput) {
            stats.rx_bandwidth = r.get("sum", "rxBandwidth");
            stats.tx_bandwidth = r.get("sum", "txBandwidth");
            stats.aborted_txns = r.get("sum", "abortedTxns");
            stats.current_load = r.get("esp", "currentLoadSpecCount");
            stats.desired_load = r.get("esp", "desiredLoadSpecCount");
        }
        stats
    }
}

/// Server side counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerStats {
    pub rx_bandwidth: f64,
    pub rx_packet_count: f64,
    pub rx_packet_rate: f64,
    pub tx_bandwidth: f64,
    pub tx_packet_count: f64,
    pub tx_packet_rate: f64,
    pub memory_main_size: f64,
    pub memory_main_used: f64,
    pub packet_memory_used: f64,
    pub rcv_queue_length: f64,
    pub cpu_utilized: f64,
    pub tcp_closed_error: f64,
    pub tcp_closed: f64,
    pub tcp_closed_reset: f64,
}

impl ServerStats {
    fn read(r: &mut Reader<'_>) -> Self {
        Self {
            rx_bandwidth: r.get("driver", "rxBandwidth"),
            rx_packet_count: r.get("driver", "rxPacketCount"),
            rx_packet_rate: r.get("driver", "rxPacketRate"),
            tx_bandwidth: r.get("driver", "txBandwidth"),
            tx_packet_count: r.get("driver", "txPacketCount"),
            tx_packet_rate: r.get("driver", "txPacketRate"),
            memory_main_size: r.get("memory", "mainPoolSize"),
            memory_main_used: r.get("memory", "mainPoolUsed"),
            packet_memory_used: r.get("memory", "packetMemoryUsed"),
            rcv_queue_length: r.get("memory", "rcvQueueLength"),
            cpu_utilized: round_to(r.get("memory", "cpuUtilized"), 1),
            tcp_closed_error: r.get("sum", "closedWithError"),
            tcp_closed: r.get("sum", "closedWithNoError"),
            tcp_closed_reset: r.get("sum", "closedWithReset"),
        }
    }
}

/// Mapped statistics for one tick plus the values derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub client: ClientStats,
    pub server: ServerStats,
    /// Client rx + tx bandwidth.
    pub total_bandwidth: f64,
    pub client_mem_pct_used: f64,
    pub server_mem_pct_used: f64,
    /// Current load divided by desired load.
    pub load_ratio: f64,
    /// Failed plus aborted transactions per successful transaction.
    pub error_rate: f64,
    /// Keys that were absent from the raw statistics.
    pub missing: Vec<String>,
}

impl RunStatistics {
    /// Map one tick of raw statistics.
    ///
    /// Derived ratios whose denominators are zero keep the value they had in
    /// `previous`.
    #[must_use]
    pub fn from_raw(raw: &RawRunStatistics, test_type: TestType, previous: &Self) -> Self {
        let client_group = Grouped::from_raw(&raw.client);
        let server_group = Grouped::from_raw(&raw.server);
        let mut missing = Vec::new();

        let mut client = ClientStats::read(
            &mut Reader {
                side: "client",
                grouped: &client_group,
                missing: &mut missing,
            },
            test_type,
        );
        let mut server_reader = Reader {
            side: "server",
            grouped: &server_group,
            missing: &mut missing,
        };
        let server = ServerStats::read(&mut server_reader);

        if test_type.is_fixed_load() {
            client.established_conn_rate = server_reader.get("sum", "connsPerSec");
        }
        if test_type == TestType::Ddos {
            client.established_conns = server_reader.get("sum", "openConns");
        }

        let client_mem_pct_used = memory_pct(client.memory_main_used, client.memory_main_size)
            .unwrap_or(previous.client_mem_pct_used);
        let server_mem_pct_used = memory_pct(server.memory_main_used, server.memory_main_size)
            .unwrap_or(previous.server_mem_pct_used);
        let load_ratio = if client.current_load > 0.0 && client.desired_load > 0.0 {
            round_to(client.current_load / client.desired_load, 2)
        } else {
            previous.load_ratio
        };
        let error_rate = if client.successful_txns > 0.0 {
            (client.unsuccessful_txns + client.aborted_txns) / client.successful_txns
        } else {
            previous.error_rate
        };

        Self {
            total_bandwidth: client.rx_bandwidth + client.tx_bandwidth,
            client,
            server,
            client_mem_pct_used,
            server_mem_pct_used,
            load_ratio,
            error_rate,
            missing,
        }
    }

    /// Elapsed and remaining seconds, required to steer a run.
    pub fn times(&self) -> Result<(f64, f64), DomainError> {
        let elapsed = self.client.time_elapsed.ok_or(DomainError::MissingStatistic {
            name: "client.timeElapsed",
        })?;
        let remaining = self
            .client
            .time_remaining
            .ok_or(DomainError::MissingStatistic {
                name: "client.timeRemaining",
            })?;
        Ok((elapsed, remaining))
    }
}

fn memory_pct(used: f64, size: f64) -> Option<f64> {
    (size > 0.0 && used > 0.0).then(|| round_to(100.0 * used / size, 2))
}
