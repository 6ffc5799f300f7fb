use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, select, tick, Sender, TryRecvError};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::models::{AppConfig, MiningStats};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub interval: Duration,
    pub min_rate: f64,
    pub max_rate: f64,
    pub acceptance_ratio: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GeneratorConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.tick_interval_ms),
            min_rate: cfg.min_hash_rate,
            max_rate: cfg.max_hash_rate,
            acceptance_ratio: cfg.acceptance_ratio,
        }
    }
}

pub type SampleCallback = Box<dyn FnMut(MiningStats) + Send + 'static>;

struct Worker {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Synthetic throughput source: one uniformly random sample per tick.
///
/// Samples are produced and delivered on a dedicated thread, one at a
/// time. `stop()` joins that thread, so once it returns no callback can
/// fire.
pub struct MetricsGenerator {
    config: GeneratorConfig,
    seed: Option<u64>,
    current: Arc<ArcSwap<MiningStats>>,
    worker: Option<Worker>,
}

impl MetricsGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            seed: None,
            current: Arc::new(ArcSwap::from_pointee(MiningStats::default())),
            worker: None,
        }
    }

    /// Deterministic sample sequence, for tests and replays.
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        let mut generator = Self::new(config);
        generator.seed = Some(seed);
        generator
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Latest sample; zeroed until the first tick after `start()`.
    pub fn current_stats(&self) -> MiningStats {
        **self.current.load()
    }

    /// Resets the counters and begins emitting samples to `on_sample`.
    /// A generator that is already running is stopped first.
    pub fn start(&mut self, mut on_sample: SampleCallback) -> std::io::Result<()> {
        if self.is_running() {
            warn!("Generator restarted while running");
            self.stop();
        }

        self.current.store(Arc::new(MiningStats::default()));

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let config = self.config.clone();
        let current = self.current.clone();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let join = thread::Builder::new()
            .name("metrics-generator".to_string())
            .spawn(move || {
                let ticker = tick(config.interval);
                let mut total = 0.0_f64;

                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            // Both may be ready at once; stop wins.
                            if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                                break;
                            }

                            let rate = rng.gen_range(config.min_rate..config.max_rate);
                            total += rate;
                            let sample = MiningStats {
                                hashes_per_second: rate,
                                total_hashes: total as u64,
                                accepted_hashes: (total * config.acceptance_ratio).floor() as u64,
                            };

                            current.store(Arc::new(sample));
                            on_sample(sample);
                        }
                    }
                }
            })?;

        self.worker = Some(Worker { stop_tx, join });
        info!(
            "Generator started ({} ms interval, {}..{} H/s)",
            self.config.interval.as_millis(),
            self.config.min_rate,
            self.config.max_rate
        );
        Ok(())
    }

    /// Halts emission and waits for the worker to finish its current tick.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.stop_tx.send(());

        if worker.join.thread().id() == thread::current().id() {
            // Called from inside the sample callback; joining would deadlock.
            // The loop exits as soon as the callback returns.
            warn!("Generator stopped from its own callback");
            return;
        }

        if worker.join.join().is_err() {
            error!("Generator thread panicked");
        }
        info!("Generator stopped");
    }
}

impl Drop for MetricsGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
