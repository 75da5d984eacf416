use std::env;
use std::io::{self, Write};
use std::process::Command;
use std::time::Instant;

/// Runs the recorder's built-in benchmark several times and summarizes it.
fn main() -> io::Result<()> {
    let num_runs = env::args()
        .nth(1)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10);

    println!("Running benchmark {} times...", num_runs);

    let mut deferred_times = Vec::with_capacity(num_runs);
    let mut eager_times = Vec::with_capacity(num_runs);
    let mut speedups = Vec::with_capacity(num_runs);

    let start_time = Instant::now();

    for i in 1..=num_runs {
        print!("Run {}/{}... ", i, num_runs);
        io::stdout().flush()?;

        let output = Command::new("cargo")
            .args(["run", "--release", "--bin", "ring_recorder", "--", "bench"])
            .output()?;

        if !output.status.success() {
            eprintln!("Benchmark failed on run {}", i);
            continue;
        }

        let output_str = String::from_utf8_lossy(&output.stdout);
        let deferred = parse_value(&output_str, "Deferred recording: ", " ms");
        let eager = parse_value(&output_str, "Eager formatting: ", " ms");

        match (deferred, eager) {
            (Some(deferred), Some(eager)) => {
                deferred_times.push(deferred);
                eager_times.push(eager);
                let speedup = eager / deferred;
                speedups.push(speedup);
                println!("Speedup: {:.2}x", speedup);
            }
            _ => println!("no timings in output"),
        }
    }

    println!("\nCompleted {} runs in {:.2?}", deferred_times.len(), start_time.elapsed());
    println!("\n===== PERFORMANCE SUMMARY =====");

    for (title, values) in [
        ("Deferred Recording Time (ms)", &deferred_times),
        ("Eager Formatting Time (ms)", &eager_times),
        ("Speedup (Eager/Deferred)", &speedups),
    ] {
        if let Some(stats) = calculate_stats(values) {
            println!("\n{}:", title);
            print_stats(&stats);
        }
    }

    Ok(())
}

fn parse_value(text: &str, prefix: &str, suffix: &str) -> Option<f64> {
    text.lines().find_map(|line| {
        let start = line.find(prefix)? + prefix.len();
        let end = line[start..].find(suffix)?;
        line[start..start + end].trim().parse::<f64>().ok()
    })
}

struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    std_dev: f64,
}

fn calculate_stats(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;

    Some(Stats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        median,
        std_dev: variance.sqrt(),
    })
}

fn print_stats(stats: &Stats) {
    let spread = if stats.mean != 0.0 {
        stats.std_dev / stats.mean * 100.0
    } else {
        0.0
    };
    println!("  Min: {:.3}", stats.min);
    println!("  Max: {:.3}", stats.max);
    println!("  Mean: {:.3}", stats.mean);
    println!("  Median: {:.3}", stats.median);
    println!("  Std Dev: {:.3} ({:.2}% of mean)", stats.std_dev, spread);
}
