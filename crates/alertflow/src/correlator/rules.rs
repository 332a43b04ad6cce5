use std::collections::HashMap;

/// Directed "cause leads to effect" relation between two alert names.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalRule {
    pub cause: &'static str,
    pub effect: &'static str,
    pub score: f64,
    pub description: &'static str,
}

pub const DEFAULT_CAUSAL_RULES: &[CausalRule] = &[
    CausalRule {
        cause: "GPUMemoryHigh",
        effect: "OOMError",
        score: 0.8,
        description: "high GPU memory leads to OOM",
    },
    CausalRule {
        cause: "NetworkLatencyHigh",
        effect: "TrainingSlowdown",
        score: 0.7,
        description: "network latency causes training slowdown",
    },
    CausalRule {
        cause: "NodeDown",
        effect: "PodRestart",
        score: 0.9,
        description: "node failure causes pod restart",
    },
    CausalRule {
        cause: "DiskSpaceLow",
        effect: "CheckpointFailed",
        score: 0.8,
        description: "low disk space causes checkpoint failure",
    },
    CausalRule {
        cause: "NCCLError",
        effect: "TrainingHang",
        score: 0.7,
        description: "NCCL error causes training hang",
    },
    CausalRule {
        cause: "HighTemperature",
        effect: "GPUThrottling",
        score: 0.8,
        description: "high temperature causes GPU throttling",
    },
];

/// Causal rules keyed by cause name.
#[derive(Debug, Clone, Default)]
pub struct CausalIndex {
    by_cause: HashMap<&'static str, Vec<CausalRule>>,
}

impl CausalIndex {
    pub fn new(rules: &[CausalRule]) -> Self {
        let mut by_cause: HashMap<&'static str, Vec<CausalRule>> = HashMap::new();
        for rule in rules {
            by_cause.entry(rule.cause).or_default().push(rule.clone());
        }
        Self { by_cause }
    }

    fn edge(&self, cause: &str, effect: &str) -> Option<&CausalRule> {
        self.by_cause
            .get(cause)
            .and_then(|rules| rules.iter().find(|r| r.effect == effect))
    }

    /// Looks for a rule linking the two names in either direction.
    pub fn lookup(&self, a: &str, b: &str) -> Option<&CausalRule> {
        self.edge(a, b).or_else(|| self.edge(b, a))
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAUSAL_RULES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_bidirectional() {
        let index = CausalIndex::with_defaults();
        let forward = index.lookup("NodeDown", "PodRestart").unwrap();
        let reverse = index.lookup("PodRestart", "NodeDown").unwrap();
        assert_eq!(forward, reverse);
        assert_eq!(forward.score, 0.9);
        assert!(index.lookup("UnrelatedAlert1", "UnrelatedAlert2").is_none());
    }

    #[test]
    fn test_every_default_rule_is_indexed() {
        let index = CausalIndex::with_defaults();
        for rule in DEFAULT_CAUSAL_RULES {
            assert_eq!(index.lookup(rule.effect, rule.cause).map(|r| r.description), Some(rule.description));
        }
    }
}
