//! Shared metrics recording for index backends.

use std::time::Instant;

/// Records operation metrics for index operations.
///
/// This function records two metrics for each operation:
/// 1. `index_operations_total` - Counter for operation count by status
/// 2. `index_operation_duration_ms` - Histogram for operation latency
///
/// # Examples
///
/// ```ignore
/// use std::time::Instant;
/// use spacesearch::storage::sqlite::record_operation_metrics;
///
/// let start = Instant::now();
/// // ... perform operation ...
/// let status = if result.is_ok() { "success" } else { "error" };
/// record_operation_metrics("sqlite", "search", start, status);
/// ```
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "index_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "index_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_record_operation_metrics_without_recorder() {
        let start = Instant::now();
        record_operation_metrics("sqlite", "search", start, "success");
        record_operation_metrics("memory", "upsert", start, "error");
    }

    #[test]
    fn test_record_operation_metrics_concurrent() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let status = if i % 2 == 0 { "success" } else { "error" };
                thread::spawn(move || {
                    let start = Instant::now();
                    thread::sleep(Duration::from_millis(i * 2));
                    record_operation_metrics("scaled", "move", start, status);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    }
}
