//! Test doubles for the pool and driver seams.

use async_trait::async_trait;
use lt_load::{LoadCounters, LoadDriver, LoadError, LoadPlan, LoadReport, LoadResult};
use lt_server::{
    AcceleratorToken, PoolError, PoolHandle, PoolResult, ServerInstance, ServerPool,
};
use lt_types::ParameterPoint;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// What the fake pool has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct PoolLedger {
    pub attempts: Vec<ParameterPoint>,
    pub acquired: u64,
    pub released: u64,
    pub live: i64,
    pub max_live: i64,
}

pub struct FakePool {
    ledger: Arc<Mutex<PoolLedger>>,
    endpoints: Vec<String>,
    fail_on: Vec<ParameterPoint>,
    fail_first: Mutex<u32>,
    startup_delay: Duration,
}

impl FakePool {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(Mutex::new(PoolLedger::default())),
            endpoints: vec!["http://fake:1".to_string()],
            fail_on: Vec::new(),
            fail_first: Mutex::new(0),
            startup_delay: Duration::ZERO,
        }
    }

    pub fn serving(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn failing_on(mut self, point: ParameterPoint) -> Self {
        self.fail_on.push(point);
        self
    }

    pub fn failing_first(self, attempts: u32) -> Self {
        *self.fail_first.lock() = attempts;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn ledger(&self) -> Arc<Mutex<PoolLedger>> {
        Arc::clone(&self.ledger)
    }
}

#[async_trait]
impl ServerPool for FakePool {
    async fn acquire<'a>(
        &self,
        token: &'a mut AcceleratorToken,
        point: &ParameterPoint,
        _model: &str,
    ) -> PoolResult<PoolHandle<'a>> {
        self.ledger.lock().attempts.push(*point);
        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }

        let injected = {
            let mut remaining = self.fail_first.lock();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };
        if injected || self.fail_on.contains(point) {
            return Err(PoolError::Internal {
                message: format!("injected startup failure for {point}"),
            });
        }

        {
            let mut ledger = self.ledger.lock();
            ledger.acquired += 1;
            ledger.live += 1;
            ledger.max_live = ledger.max_live.max(ledger.live);
        }

        let instances = (0..point.instances as usize)
            .map(|i| ServerInstance::external(i, self.endpoints[i % self.endpoints.len()].clone()))
            .collect();
        Ok(PoolHandle::new(token, *point, instances))
    }

    async fn release(&self, handle: &mut PoolHandle<'_>) {
        if handle.is_released() {
            return;
        }
        handle.shutdown(Duration::ZERO).await;
        let mut ledger = self.ledger.lock();
        ledger.released += 1;
        ledger.live -= 1;
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Scripted load behaviour.
pub enum FakeLoad {
    /// Every request dispatched at once; `(tokens, failed)` per cell from
    /// the instance count and plan. Reports a one second wall time.
    Totals(Box<dyn Fn(usize, &LoadPlan) -> (u64, u64) + Send + Sync>),
    /// One request every `interval`; every `fail_every`-th fails.
    Trickle {
        interval: Duration,
        tokens: u64,
        fail_every: u64,
    },
    /// Completes `sent` requests, then errors.
    Error { sent: u64 },
    /// Completes `sent` requests, then panics.
    Panic { sent: u64 },
}

pub struct FakeDriver {
    load: FakeLoad,
}

impl FakeDriver {
    pub fn new(load: FakeLoad) -> Self {
        Self { load }
    }

    pub fn totals<F>(f: F) -> Self
    where
        F: Fn(usize, &LoadPlan) -> (u64, u64) + Send + Sync + 'static,
    {
        Self::new(FakeLoad::Totals(Box::new(f)))
    }
}

#[async_trait]
impl LoadDriver for FakeDriver {
    async fn drive(
        &self,
        endpoints: Vec<String>,
        plan: LoadPlan,
        counters: Arc<LoadCounters>,
    ) -> LoadResult<LoadReport> {
        match &self.load {
            FakeLoad::Totals(f) => {
                let (tokens, failed) = f(endpoints.len(), &plan);
                for _ in 0..plan.request_count {
                    counters.record_sent();
                }
                for _ in 0..failed {
                    counters.record_failed();
                }
                // The first success carries every token.
                let succeeded = plan.request_count.saturating_sub(failed);
                for i in 0..succeeded {
                    counters.record_succeeded(if i == 0 { tokens } else { 0 });
                }
                Ok(LoadReport {
                    wall_time: Duration::from_secs(1),
                    totals: counters.snapshot(),
                })
            }
            FakeLoad::Trickle {
                interval,
                tokens,
                fail_every,
            } => {
                let started = tokio::time::Instant::now();
                for i in 1..=plan.request_count {
                    counters.record_sent();
                    tokio::time::sleep(*interval).await;
                    if *fail_every > 0 && i % fail_every == 0 {
                        counters.record_failed();
                    } else {
                        counters.record_succeeded(*tokens);
                    }
                }
                Ok(LoadReport {
                    wall_time: started.elapsed(),
                    totals: counters.snapshot(),
                })
            }
            FakeLoad::Error { sent } => {
                for _ in 0..*sent {
                    counters.record_sent();
                    counters.record_succeeded(1);
                }
                Err(LoadError::InvalidPlan {
                    message: "injected driver error".to_string(),
                })
            }
            FakeLoad::Panic { sent } => {
                for _ in 0..*sent {
                    counters.record_sent();
                    counters.record_succeeded(1);
                }
                panic!("injected driver panic");
            }
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}
