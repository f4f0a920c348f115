// Demo binary: drives a synthetic workload through the LOOK pipeline and
// prints the queue metrics as JSON on exit.

use look_iosched::pipeline::{Pipeline, PipelineConfig};
use look_iosched::request::{IoDir, Request};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Command-line options parsed from program arguments.
struct CliOptions {
    /// Requests to generate; 0 means run until Ctrl+C.
    requests: u64,
    /// Workload generator seed.
    seed: u64,
    /// Sector span the workload draws from.
    span: u64,
    /// Outstanding-command depth of the simulated device.
    driver_depth: usize,
    /// Log per-request add/dsp diagnostics.
    verbose: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            requests: 256,
            seed: 0x5EED,
            span: 1 << 20,
            driver_depth: 32,
            verbose: false,
        }
    }
}

fn parse_cli_options() -> CliOptions {
    let mut options = CliOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--verbose" {
            options.verbose = true;
            continue;
        }
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (arg, args.next()),
        };
        match (key.as_str(), value) {
            ("--requests", Some(v)) => options.requests = v.parse().unwrap_or(options.requests),
            ("--seed", Some(v)) => options.seed = v.parse().unwrap_or(options.seed),
            ("--span", Some(v)) => options.span = v.parse().unwrap_or(options.span),
            ("--driver-depth", Some(v)) => {
                options.driver_depth = v.parse().unwrap_or(options.driver_depth)
            }
            _ => {}
        }
    }
    options
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0xDEAD_BEEF_DEAD_BEEF } else { seed };
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Synthetic request stream: mostly random sectors, with an occasional
/// follow-up starting where the previous request ended to exercise the
/// queue's back-merge pass.
struct Workload {
    rng: XorShift64,
    span: u64,
    last_end: u64,
}

impl Workload {
    fn new(seed: u64, span: u64) -> Self {
        Self {
            rng: XorShift64::new(seed),
            span,
            last_end: 0,
        }
    }

    fn next_request(&mut self) -> Request {
        let sector = if self.rng.next_u64() % 4 == 0 {
            self.last_end
        } else {
            self.rng.next_u64() % self.span
        };
        let sectors = (self.rng.next_u64() % 8 + 1) as u32;
        let dir = if self.rng.next_u64() % 2 == 0 {
            IoDir::Read
        } else {
            IoDir::Write
        };
        self.last_end = sector + u64::from(sectors);
        Request::new(dir, sector, sectors)
    }
}

/// Minimal sink for the `log` facade; the library never picks one itself.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        eprintln!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_cli_options();

    log::set_logger(&LOGGER)?;
    log::set_max_level(if options.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let config = PipelineConfig {
        driver_depth: options.driver_depth,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config)?;
    pipeline.start();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::Relaxed);
    })?;

    let mut workload = Workload::new(options.seed, options.span);
    if options.requests == 0 {
        log::info!("submitting until Ctrl+C");
        while !shutdown.load(Ordering::Relaxed) {
            pipeline.submit(workload.next_request())?;
            std::thread::sleep(Duration::from_micros(200));
        }
    } else {
        log::info!("submitting {} requests", options.requests);
        for _ in 0..options.requests {
            pipeline.submit(workload.next_request())?;
        }
    }

    pipeline.drain();
    let snapshot = pipeline.metrics().snapshot();
    pipeline.detach();

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
