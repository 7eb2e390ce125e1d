//! Detailed report rows: one row per sampling tick.

use super::rolling::StatKind;
use super::run::{RunProfile, RunState};

/// Column names of the detailed report, in order.
pub const COLUMNS: [&str; 59] = [
    "test_name",
    "seconds",
    "state",
    "current_load",
    "desired_load",
    "seek_ready",
    "tps",
    "tps_stable",
    "tps_delta",
    "successful_txn",
    "unsuccessful_txn",
    "aborted_txn",
    "txn_error_rate",
    "cps",
    "cps_stable",
    "cps_delta",
    "open_conns",
    "conns_stable",
    "conns_delta",
    "tcp_avg_tt_synack",
    "tcp_avg_ttfb",
    "ttfb_stable",
    "ttfb_delta",
    "url_response_time",
    "total_tcp_established",
    "total_tcp_attempted",
    "total_bandwidth",
    "bw_stable",
    "bw_delta",
    "rx_bandwidth",
    "tx_bandwidth",
    "rx_packet_rate",
    "tx_packet_rate",
    "tcp_closed",
    "tcp_reset",
    "tcp_error",
    "simusers_alive",
    "simusers_animating",
    "simusers_blocking",
    "simusers_sleeping",
    "client_cpu",
    "client_mem",
    "client_pkt_mem",
    "client_rcv_queue",
    "server_cpu",
    "server_mem",
    "server_pkt_mem",
    "server_rcv_queue",
    "test_type_v1",
    "test_type_v2",
    "load_type",
    "test_id",
    "run_id",
    "t_run",
    "t_start",
    "t_tx",
    "t_stop",
    "version",
    "report",
];

/// One row of the detailed report, rendered to strings in [`COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    cells: Vec<String>,
}

impl ResultRow {
    /// Snapshot the current tick.
    #[must_use]
    pub fn capture(profile: &RunProfile, state: &RunState, version: &str) -> Self {
        let c = &state.stats.client;
        let s = &state.stats.server;
        let r = &state.rolling;
        let num = |v: f64| v.to_string();
        let flag = |v: bool| v.to_string();

        let cells = vec![
            profile.config.name.clone(),
            num(state.elapsed),
            state.phase.map(|p| p.to_string()).unwrap_or_default(),
            num(c.current_load),
            num(c.desired_load),
            flag(state.seek_ready()),
            num(c.successful_txns_per_sec),
            flag(r.get(StatKind::Tps).is_stable()),
            num(r.get(StatKind::Tps).increase_pct()),
            num(c.successful_txns),
            num(c.unsuccessful_txns),
            num(c.aborted_txns),
            num(state.stats.error_rate),
            num(c.established_conn_rate),
            flag(r.get(StatKind::Cps).is_stable()),
            num(r.get(StatKind::Cps).increase_pct()),
            num(c.established_conns),
            flag(r.get(StatKind::Conns).is_stable()),
            num(r.get(StatKind::Conns).increase_pct()),
            num(c.avg_tt_synack),
            num(c.avg_ttfb),
            flag(r.get(StatKind::Ttfb).is_stable()),
            num(r.get(StatKind::Ttfb).increase_pct()),
            num(c.url_avg_response_time),
            num(c.cumulative_established_conns),
            num(c.cumulative_attempted_conns),
            num(state.stats.total_bandwidth),
            flag(r.get(StatKind::Bw).is_stable()),
            num(r.get(StatKind::Bw).increase_pct()),
            num(c.rx_bandwidth),
            num(c.tx_bandwidth),
            num(c.rx_packet_rate),
            num(c.tx_packet_rate),
            num(s.tcp_closed),
            num(s.tcp_closed_reset),
            num(s.tcp_closed_error),
            num(c.simusers_alive),
            num(c.simusers_animating),
            num(c.simusers_blocking),
            num(c.simusers_sleeping),
            num(c.cpu_utilized),
            num(state.stats.client_mem_pct_used),
            num(c.packet_memory_used),
            num(c.rcv_queue_length),
            num(s.cpu_utilized),
            num(state.stats.server_mem_pct_used),
            num(s.packet_memory_used),
            num(s.rcv_queue_length),
            state.type_v1.clone(),
            profile.config.test_type.clone(),
            profile.load_type_label().to_string(),
            profile.config.test_id.clone(),
            state.run_id.clone(),
            state.timings.to_run.to_string(),
            state.timings.to_start.to_string(),
            state.timings.to_activity.to_string(),
            state.timings.to_stop.to_string(),
            version.to_string(),
            state.report_link.clone().unwrap_or_default(),
        ];
        Self { cells }
    }

    #[must_use]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = COLUMNS.iter().position(|c| *c == column)?;
        self.cells.get(index).map(String::as_str)
    }
}
