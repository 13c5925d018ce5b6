//! Prometheus metrics

use nitro_core::{Amount, NitroError, Result, RiskLevel};
use nitro_economics::EmissionShortfall;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Economy counters
pub struct EconomyMetrics {
    registry: Registry,
    races_settled: IntCounter,
    np_minted: IntCounter,
    np_burned: IntCounter,
    np_to_pool: IntCounter,
    np_to_treasury: IntCounter,
    blocked_assessments: IntCounter,
    assessments: IntCounterVec,
    emission_shortfalls: IntCounterVec,
}

impl EconomyMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let races_settled = IntCounter::new("nitro_races_settled_total", "Races settled")
            .map_err(metrics_error)?;
        let np_minted = IntCounter::new("nitro_np_minted_total", "NP minted as race rewards")
            .map_err(metrics_error)?;
        let np_burned =
            IntCounter::new("nitro_np_burned_total", "NP burned by spends").map_err(metrics_error)?;
        let np_to_pool = IntCounter::new("nitro_np_reward_pool_total", "NP routed to the reward pool")
            .map_err(metrics_error)?;
        let np_to_treasury = IntCounter::new("nitro_np_treasury_total", "NP routed to the treasury")
            .map_err(metrics_error)?;
        let blocked_assessments = IntCounter::new(
            "nitro_blocked_assessments_total",
            "Assessments that withheld the whole reward",
        )
        .map_err(metrics_error)?;
        let assessments = IntCounterVec::new(
            Opts::new("nitro_risk_assessments_total", "Risk assessments by level"),
            &["level"],
        )
        .map_err(metrics_error)?;
        let emission_shortfalls = IntCounterVec::new(
            Opts::new(
                "nitro_emission_shortfalls_total",
                "Emissions that granted less than requested",
            ),
            &["reason"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(races_settled.clone())).map_err(metrics_error)?;
        registry.register(Box::new(np_minted.clone())).map_err(metrics_error)?;
        registry.register(Box::new(np_burned.clone())).map_err(metrics_error)?;
        registry.register(Box::new(np_to_pool.clone())).map_err(metrics_error)?;
        registry.register(Box::new(np_to_treasury.clone())).map_err(metrics_error)?;
        registry
            .register(Box::new(blocked_assessments.clone()))
            .map_err(metrics_error)?;
        registry.register(Box::new(assessments.clone())).map_err(metrics_error)?;
        registry
            .register(Box::new(emission_shortfalls.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            races_settled,
            np_minted,
            np_burned,
            np_to_pool,
            np_to_treasury,
            blocked_assessments,
            assessments,
            emission_shortfalls,
        })
    }

    pub fn record_race(&self, level: RiskLevel, blocked: bool, minted: Amount) {
        self.races_settled.inc();
        self.np_minted.inc_by(minted);
        self.assessments
            .with_label_values(&[level.to_string().as_str()])
            .inc();
        if blocked {
            self.blocked_assessments.inc();
        }
    }

    pub fn record_shortfall(&self, reason: EmissionShortfall) {
        self.emission_shortfalls
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn record_spend(&self, burned: Amount, to_pool: Amount, to_treasury: Amount) {
        self.np_burned.inc_by(burned);
        self.np_to_pool.inc_by(to_pool);
        self.np_to_treasury.inc_by(to_treasury);
    }

    pub fn races_settled(&self) -> u64 {
        self.races_settled.get()
    }

    pub fn np_minted(&self) -> u64 {
        self.np_minted.get()
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| NitroError::Serialization(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> NitroError {
    NitroError::Internal(format!("metrics: {}", e))
}
