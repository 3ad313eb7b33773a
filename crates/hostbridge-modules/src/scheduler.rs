//! Periodic sampling, one independent task per module.
//!
//! Each module runs its own loop, so a slow or failing sampler never
//! delays another module. Every sample is bounded by the configured
//! timeout; a timeout or error marks the entry `ok=false` and keeps the
//! last known data.
//!
//! Forced resamples (`get` with `refresh`) are sent to the module's loop.
//! A force request that arrives while a sample is already running is
//! answered with that sample's result instead of starting another one, so
//! a module never has more than one sample in flight. Forcing does not
//! reset the periodic cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hostbridge_core::{BridgeError, ModuleName, ModuleSnapshot};
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ModuleCache;
use crate::sampler::{ModuleSampler, SampleError, SamplerSet};

/// Samples taken (counter, labels: module, outcome).
pub const MODULE_SAMPLES_TOTAL: &str = "module_samples_total";
/// Sample duration seconds (histogram, labels: module).
pub const MODULE_SAMPLE_DURATION_SECONDS: &str = "module_sample_duration_seconds";

/// Pending force requests per module before callers wait for room.
const FORCE_QUEUE_CAPACITY: usize = 32;

/// Cadence and deadline configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Cadence for modules without an override.
    pub default_interval: Duration,
    /// Per-module cadence overrides.
    pub intervals: HashMap<ModuleName, Duration>,
    /// Deadline for one sample.
    pub sample_timeout: Duration,
}

impl SchedulerConfig {
    /// Effective cadence for `module`.
    pub fn interval_for(&self, module: ModuleName) -> Duration {
        self.intervals
            .get(&module)
            .copied()
            .unwrap_or(self.default_interval)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(30),
            intervals: HashMap::new(),
            sample_timeout: Duration::from_secs(10),
        }
    }
}

type ForceReply = oneshot::Sender<Arc<ModuleSnapshot>>;

/// Drives every sampler on its own cadence.
pub struct PollScheduler {
    cache: Arc<ModuleCache>,
    force_tx: HashMap<ModuleName, mpsc::Sender<ForceReply>>,
    handles: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    /// Spawn one sampling task per sampler in `samplers`.
    ///
    /// Modules without a sampler keep their default cache entry. Tasks stop
    /// when `cancel` fires.
    pub fn start(
        samplers: &SamplerSet,
        cache: Arc<ModuleCache>,
        config: &SchedulerConfig,
        cancel: &CancellationToken,
    ) -> Self {
        let mut force_tx = HashMap::new();
        let mut handles = Vec::new();

        for module in samplers.modules() {
            let Some(sampler) = samplers.get(module) else {
                continue;
            };
            let (tx, rx) = mpsc::channel(FORCE_QUEUE_CAPACITY);
            let worker = ModuleWorker {
                module,
                sampler,
                cache: cache.clone(),
                interval: config.interval_for(module),
                timeout: config.sample_timeout,
            };
            handles.push(tokio::spawn(worker.run(rx, cancel.child_token())));
            let _ = force_tx.insert(module, tx);
        }

        info!(modules = handles.len(), "poll scheduler started");
        Self {
            cache,
            force_tx,
            handles,
        }
    }

    /// The cache this scheduler writes to.
    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Resample `module` now and return the resulting entry.
    ///
    /// Coalesces with a sample already in flight. Modules without a sampler
    /// (or whose task has stopped) return their current cache entry.
    pub async fn force(&self, module: ModuleName) -> Arc<ModuleSnapshot> {
        let Some(tx) = self.force_tx.get(&module) else {
            return self.cache.get(module);
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(reply_tx).await.is_err() {
            return self.cache.get(module);
        }
        match reply_rx.await {
            Ok(snapshot) => snapshot,
            Err(_) => self.cache.get(module),
        }
    }

    /// Take the task handles, for graceful shutdown.
    pub fn take_handles(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.handles)
    }
}

/// Sampling loop state for one module.
struct ModuleWorker {
    module: ModuleName,
    sampler: Arc<dyn ModuleSampler>,
    cache: Arc<ModuleCache>,
    interval: Duration,
    timeout: Duration,
}

impl ModuleWorker {
    async fn run(self, mut force_rx: mpsc::Receiver<ForceReply>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(module = %self.module, interval_ms = self.interval.as_millis() as u64, "module loop started");

        loop {
            let mut waiters = Vec::new();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                req = force_rx.recv() => match req {
                    Some(reply) => waiters.push(reply),
                    None => break,
                },
            }

            let snapshot = self.sample_once().await;

            // Requests that queued up during the sample share its result.
            while let Ok(reply) = force_rx.try_recv() {
                waiters.push(reply);
            }
            for reply in waiters {
                let _ = reply.send(snapshot.clone());
            }
        }
        debug!(module = %self.module, "module loop stopped");
    }

    /// Take one bounded sample and record it in the cache.
    async fn sample_once(&self) -> Arc<ModuleSnapshot> {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.sampler.sample()).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(err)) => Err(self.failure(&err)),
            Err(_elapsed) => Err(BridgeError::SampleTimeout {
                module: self.module,
                timeout: self.timeout,
            }),
        };
        histogram!(MODULE_SAMPLE_DURATION_SECONDS, "module" => self.module.as_str())
            .record(start.elapsed().as_secs_f64());

        let previous = self.cache.get(self.module);
        let (next, changed) = match outcome {
            Ok(data) => {
                counter!(MODULE_SAMPLES_TOTAL, "module" => self.module.as_str(), "outcome" => "ok")
                    .increment(1);
                let changed = !previous.ok || previous.data != data;
                (ModuleSnapshot::sampled(self.module, data), changed)
            }
            Err(err) => {
                counter!(MODULE_SAMPLES_TOTAL, "module" => self.module.as_str(), "outcome" => "error")
                    .increment(1);
                // Only the ok -> failed edge is announced.
                if previous.ok {
                    warn!(module = %self.module, error = %err, "module sampling failed");
                } else {
                    debug!(module = %self.module, error = %err, "module still failing");
                }
                (previous.failed(err.to_string()), previous.ok)
            }
        };

        let next = Arc::new(next);
        let _ = self.cache.set(next.clone());
        if changed {
            self.cache.notify_changed(self.module);
        }
        next
    }

    fn failure(&self, err: &SampleError) -> BridgeError {
        BridgeError::SampleFailure {
            module: self.module,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    /// Returns a counter that increments per sample, optionally failing.
    struct CountingSampler {
        module: ModuleName,
        calls: Arc<AtomicU32>,
        fail: Arc<AtomicBool>,
        delay: Duration,
        constant: bool,
    }

    impl CountingSampler {
        fn new(module: ModuleName) -> Self {
            Self {
                module,
                calls: Arc::new(AtomicU32::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
                constant: false,
            }
        }
    }

    #[async_trait]
    impl ModuleSampler for CountingSampler {
        fn module(&self) -> ModuleName {
            self.module
        }

        async fn sample(&self) -> Result<Value, SampleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SampleError::Failed("device gone".into()));
            }
            if self.constant {
                Ok(json!({"value": 1}))
            } else {
                Ok(json!({"value": n}))
            }
        }
    }

    fn config(interval: Duration) -> SchedulerConfig {
        SchedulerConfig {
            default_interval: interval,
            intervals: HashMap::new(),
            sample_timeout: Duration::from_secs(1),
        }
    }

    /// Let spawned tasks run until they block.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_sample_is_immediate() {
        let cache = Arc::new(ModuleCache::new());
        let sampler = CountingSampler::new(ModuleName::Cpu);
        let calls = sampler.calls.clone();
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let _sched = PollScheduler::start(&set, cache.clone(), &config(Duration::from_secs(5)), &cancel);

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let entry = cache.get(ModuleName::Cpu);
        assert!(entry.ok);
        assert_eq!(entry.data, json!({"value": 1}));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn samples_on_cadence() {
        let cache = Arc::new(ModuleCache::new());
        let sampler = CountingSampler::new(ModuleName::Memory);
        let calls = sampler.calls.clone();
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let _sched = PollScheduler::start(&set, cache, &config(Duration::from_secs(5)), &cancel);

        settle().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_data_does_not_signal() {
        let cache = Arc::new(ModuleCache::new());
        let mut changes = cache.subscribe();
        let mut sampler = CountingSampler::new(ModuleName::System);
        sampler.constant = true;
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let sched = PollScheduler::start(&set, cache, &config(Duration::from_secs(60)), &cancel);

        settle().await;
        assert_eq!(changes.try_recv().unwrap(), ModuleName::System);
        let _ = sched.force(ModuleName::System).await;
        assert!(changes.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_signals_only_on_transition() {
        let cache = Arc::new(ModuleCache::new());
        let mut changes = cache.subscribe();
        let sampler = CountingSampler::new(ModuleName::Disks);
        let fail = sampler.fail.clone();
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let sched = PollScheduler::start(&set, cache.clone(), &config(Duration::from_secs(60)), &cancel);

        settle().await;
        assert_eq!(changes.try_recv().unwrap(), ModuleName::Disks);

        fail.store(true, Ordering::SeqCst);
        let failed = sched.force(ModuleName::Disks).await;
        assert!(!failed.ok);
        assert_eq!(failed.data, json!({"value": 1}), "last data kept");
        assert!(failed.error.as_deref().unwrap().contains("device gone"));
        assert_eq!(changes.try_recv().unwrap(), ModuleName::Disks);

        // Still failing: no further signal.
        let _ = sched.force(ModuleName::Disks).await;
        assert!(changes.try_recv().is_err());

        // Recovery signals again.
        fail.store(false, Ordering::SeqCst);
        let recovered = sched.force(ModuleName::Disks).await;
        assert!(recovered.ok);
        assert!(recovered.error.is_none());
        assert_eq!(changes.try_recv().unwrap(), ModuleName::Disks);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_marks_entry_failed() {
        let cache = Arc::new(ModuleCache::new());
        let mut sampler = CountingSampler::new(ModuleName::Gpus);
        sampler.delay = Duration::from_secs(5);
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let sched = PollScheduler::start(&set, cache, &config(Duration::from_secs(60)), &cancel);

        let entry = sched.force(ModuleName::Gpus).await;
        assert!(!entry.ok);
        assert!(entry.error.as_deref().unwrap().contains("timed out"));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_module_does_not_delay_others() {
        let cache = Arc::new(ModuleCache::new());
        let mut slow = CountingSampler::new(ModuleName::Disks);
        slow.delay = Duration::from_secs(30);
        let fast = CountingSampler::new(ModuleName::Cpu);
        let set = SamplerSet::new().with(slow).with(fast);
        let cancel = CancellationToken::new();
        let _sched = PollScheduler::start(&set, cache.clone(), &config(Duration::from_secs(60)), &cancel);

        settle().await;
        assert!(cache.get(ModuleName::Cpu).ok);
        assert!(cache.get(ModuleName::Disks).sampled_at.is_none());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_forces_coalesce() {
        let cache = Arc::new(ModuleCache::new());
        let mut sampler = CountingSampler::new(ModuleName::Processes);
        sampler.delay = Duration::from_millis(100);
        let calls = sampler.calls.clone();
        let set = SamplerSet::new().with(sampler);
        let cancel = CancellationToken::new();
        let sched = Arc::new(PollScheduler::start(
            &set,
            cache,
            &config(Duration::from_secs(60)),
            &cancel,
        ));

        // Let the immediate first sample finish.
        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let a = tokio::spawn({
            let s = sched.clone();
            async move { s.force(ModuleName::Processes).await }
        });
        settle().await;
        let b = tokio::spawn({
            let s = sched.clone();
            async move { s.force(ModuleName::Processes).await }
        });
        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2, "second force joined the in-flight sample");
        assert_eq!(a, b);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn force_on_unscheduled_module_returns_cache() {
        let cache = Arc::new(ModuleCache::new());
        let cancel = CancellationToken::new();
        let sched = PollScheduler::start(&SamplerSet::new(), cache, &SchedulerConfig::default(), &cancel);
        let entry = sched.force(ModuleName::Media).await;
        assert!(!entry.ok);
        assert!(entry.sampled_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_tasks() {
        let cache = Arc::new(ModuleCache::new());
        let set = SamplerSet::new().with(CountingSampler::new(ModuleName::Cpu));
        let cancel = CancellationToken::new();
        let mut sched = PollScheduler::start(&set, cache, &SchedulerConfig::default(), &cancel);
        cancel.cancel();
        for handle in sched.take_handles() {
            handle.await.unwrap();
        }
    }

    #[test]
    fn per_module_interval_override() {
        let mut cfg = SchedulerConfig::default();
        let _ = cfg.intervals.insert(ModuleName::Cpu, Duration::from_secs(2));
        assert_eq!(cfg.interval_for(ModuleName::Cpu), Duration::from_secs(2));
        assert_eq!(cfg.interval_for(ModuleName::Disks), Duration::from_secs(30));
    }
}
