//! End-to-end pipeline report: runs producer → ring → matcher over a seeded
//! synthetic stream and prints throughput plus dispatch-latency percentiles.
//!
//! Usage: `throughput_report [events] [ring_capacity] [seed]`

use std::time::Instant;

use tickmatch::{run_pipeline, PipelineConfig};

fn parse_arg(args: &[String], idx: usize, default: usize) -> usize {
    args.get(idx)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let events = parse_arg(&args, 1, 1 << 22);
    let ring_capacity = parse_arg(&args, 2, 1024);
    let seed = parse_arg(&args, 3, 0) as u64;

    println!("Running {} events through a {}-slot ring (seed {})...", events, ring_capacity, seed);

    let start = Instant::now();
    let outcome = run_pipeline(PipelineConfig {
        ring_capacity,
        events,
        seed,
        pin_consumer: true,
        ..PipelineConfig::default()
    });
    let elapsed = start.elapsed();

    let stats = &outcome.stats;
    let lat = stats.latency.summary();
    let secs = elapsed.as_secs_f64();

    println!("\n=== Dispatch Latency (ns) ===");
    println!("Samples: {}", lat.count);
    println!("-----------------------------");
    println!("Min:    {:8}", lat.min);
    println!("P50:    {:8}", lat.p50);
    println!("P95:    {:8}", lat.p95);
    println!("P99:    {:8}", lat.p99);
    println!("P99.9:  {:8}", lat.p999);
    println!("Max:    {:8}", lat.max);

    println!("\n=== Throughput ===");
    println!(
        "{} events in {:.0} ms, {:.0} events/s",
        stats.consumed.total,
        secs * 1e3,
        stats.consumed.total as f64 / secs
    );
    println!(
        "{} trades, {:.0} trades/s",
        outcome.trades.len(),
        outcome.trades.len() as f64 / secs
    );
    println!(
        "mix: {} new / {} cancel / {} replace",
        stats.consumed.new, stats.consumed.cancel, stats.consumed.replace
    );
    println!(
        "book: {} records indexed, {} live",
        outcome.book.order_count(),
        outcome.book.active_order_count()
    );

    outcome.book.log_books();
}
