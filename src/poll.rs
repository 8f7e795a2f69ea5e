//! Fixed-rate scheduling of report cycles.

use crate::reporter::DatadogReporter;
use crate::time;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a reporter on its own thread, once per interval.
///
/// Ticks are scheduled from the start time, not from the end of the previous
/// cycle, so a slow cycle does not push later ones back. A cycle that
/// overruns its interval is followed immediately by the next; cycles never
/// overlap.
pub struct Poller {
    handle: thread::JoinHandle<()>,
    stop: Arc<AtomicBool>,
    reporter: Arc<DatadogReporter>,
}

impl Poller {
    /// Spawn the polling thread. The first cycle runs one `interval` after
    /// this call.
    pub fn start(reporter: DatadogReporter, interval: Duration) -> Poller {
        let reporter = Arc::new(reporter);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_reporter = Arc::clone(&reporter);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let mut ticks: u32 = 0;
            loop {
                ticks = ticks.saturating_add(1);
                let next = match interval.checked_mul(ticks).and_then(|d| start.checked_add(d)) {
                    Some(next) => next,
                    None => {
                        error!("poll interval {:?} overflows the clock, stopping", interval);
                        break;
                    }
                };
                let now = Instant::now();
                if next > now {
                    time::delay_until(next - now, || thread_stop.load(Ordering::Acquire));
                }
                if thread_stop.load(Ordering::Acquire) {
                    break;
                }
                thread_reporter.run();
            }
            debug!("poller stopped after {} ticks", ticks);
        });
        Poller {
            handle,
            stop,
            reporter,
        }
    }

    /// Stop polling, wait for an in-flight cycle to finish, then shut the
    /// reporter down. No cycle runs after this returns.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            error!("poller thread panicked");
        }
        self.reporter.shutdown();
    }
}
