//! Statistics display and formatting

use crate::sim::SimReport;
use rtp_jbuf::JitterState;
use rtp_stream::StreamStats;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format a percentage of `part` in `total`
pub fn format_percent(part: u64, total: u64) -> String {
    if total == 0 {
        "0.00%".to_string()
    } else {
        format!("{:.2}%", part as f64 * 100.0 / total as f64)
    }
}

/// One-line jitter buffer summary
pub fn format_jitter_state(state: &JitterState) -> String {
    format!(
        "jb size={} prefetch={} [{}..{}] delay avg={}ms min={}ms max={}ms dev={}ms burst={} lost={} discard={} empty={}",
        state.size,
        state.prefetch,
        state.min_prefetch,
        state.max_prefetch,
        state.avg_delay,
        state.min_delay,
        state.max_delay,
        state.dev_delay,
        state.avg_burst,
        state.lost,
        state.discard,
        state.empty
    )
}

/// One-line stream summary
pub fn format_stream_stats(stats: &StreamStats, elapsed: Duration) -> String {
    format!(
        "[{}] tx {} pkts / {} | rx {} pkts / {} | malformed={} rejected={} discarded={} restarts={} dtmf tx={} rx={} | {}",
        format_duration(elapsed),
        stats.tx.packets,
        format_bytes(stats.tx.bytes),
        stats.rx.packets,
        format_bytes(stats.rx.bytes),
        stats.rx_malformed,
        stats.rx_rejected,
        stats.rx_discarded,
        stats.rx_restarts,
        stats.dtmf_sent,
        stats.dtmf_received,
        format_jitter_state(&stats.jitter)
    )
}

/// Print a simulation report
pub fn display_sim_report(report: &SimReport) {
    let ticks = report.ticks();
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ NETWORK                                                     │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Frames sent:       {:>10}", report.sent);
    println!(
        "│ Lost in network:   {:>10} ({})",
        report.network_lost,
        format_percent(report.network_lost, report.sent)
    );
    println!("│ Duplicated:        {:>10}", report.duplicated);
    println!("│ Refused by buffer: {:>10}", report.put_discarded);
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ PLAYOUT                                                     │");
    println!("├─────────────────────────────────────────────────────────────┤");
    for (name, count) in [
        ("Normal", report.normal),
        ("Missing", report.missing),
        ("Empty", report.zero_empty),
        ("Prefetching", report.zero_prefetch),
    ] {
        println!(
            "│ {:<18} {:>10} ({})",
            format!("{}:", name),
            count,
            format_percent(count, ticks)
        );
    }
    println!("│ Out of order:      {:>10}", report.out_of_order);
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ JITTER BUFFER                                               │");
    println!("├─────────────────────────────────────────────────────────────┤");
    let state = &report.jitter;
    println!(
        "│ Prefetch:          {} (bounds {}..{})",
        state.prefetch, state.min_prefetch, state.max_prefetch
    );
    println!("│ Size:              {}", state.size);
    println!(
        "│ Delay:             avg {}ms, min {}ms, max {}ms, dev {}ms",
        state.avg_delay, state.min_delay, state.max_delay, state.dev_delay
    );
    println!("│ Average burst:     {}", state.avg_burst);
    println!(
        "│ Lost/discard/empty: {}/{}/{}",
        state.lost, state.discard, state.empty
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 01m 01s");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(1, 4), "25.00%");
        assert_eq!(format_percent(3, 0), "0.00%");
    }

    #[test]
    fn test_format_jitter_state() {
        let state = JitterState {
            size: 3,
            prefetch: 2,
            max_prefetch: 80,
            avg_delay: 40,
            ..JitterState::default()
        };
        let line = format_jitter_state(&state);
        assert!(line.starts_with("jb size=3 prefetch=2 [0..80]"));
        assert!(line.contains("avg=40ms"));
    }

    #[test]
    fn test_format_stream_stats() {
        let mut stats = StreamStats::default();
        stats.tx.packets = 50;
        stats.tx.bytes = 16_600;
        let line = format_stream_stats(&stats, Duration::from_secs(1));
        assert!(line.starts_with("[1s] tx 50 pkts / 16.21 KB"));
    }
}
