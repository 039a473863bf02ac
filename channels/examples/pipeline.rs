// examples/pipeline.rs
//
// Runs each of the four topologies once and prints the run reports.
// Set RUST_LOG=strand=debug to watch every channel operation.

use strand::topology::{Coordinator, Observer, Pattern, TopologyConfig};

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strand=info")),
    )
    .init();

  let observer = Observer::default();

  for (pattern, capacity, messages) in [
    (Pattern::Pipeline, 2, 10),
    (Pattern::FanOut, 1, 12),
    (Pattern::FanIn, 1, 15),
    (Pattern::PingPong, 0, 5),
  ] {
    let config = TopologyConfig::new(pattern, capacity, messages);
    let report = Coordinator::build(config)
      .expect("config rejected")
      .run(&observer)
      .expect("run failed");

    println!("--- {} ---", report.pattern);
    println!(
      "sent {} / received {} in {:?} ({:.1} msg/s)",
      report.total_sent, report.total_received, report.elapsed, report.throughput
    );
    println!(
      "blocked ops: {}, max buffer depth: {}, avg handoff latency: {:?}",
      report.blocked_ops, report.max_buffer_depth, report.avg_handoff_latency
    );
    println!(
      "{}",
      serde_json::to_string_pretty(&report.processes).expect("report is serializable")
    );
  }
}
