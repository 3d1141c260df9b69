// document.rs — YAML policy documents.
//
// A document describes the policy tree handed to the engine:
//
//   strategy: or
//   policies:
//     - name: no-deletes
//       accept: ["java.io.File.*"]
//       kind: action
//       sre: { type: leaf, negative: "java.io.File.delete()" }
//     - name: mail
//       strategy: and
//       children:
//         - name: log-sends
//           sre: { type: leaf, positive: "pkg.mail.Log.write(#String{$subject})" }
//
// An entry with `children` is a composite; an entry with `sre` is a leaf.
// Everything is validated when the tree is built: strategy names, accept
// globs and leaf patterns. A document that builds is safe to run.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use poco_sre::{Sre, Strategy};

use crate::config::EngineConfig;
use crate::engine::DecisionEngine;
use crate::error::EngineError;
use crate::event::EventKind;
use crate::policy::{AcceptFilter, CompositePolicy, Policy, SrePolicy};
use crate::warehouse::Warehouse;

/// The root of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Combines the top-level policies. Falls back to the engine config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicySpec {
    Composite(CompositeSpec),
    Leaf(LeafSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub children: Vec<PolicySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeafSpec {
    pub name: String,
    /// Signature globs; empty accepts everything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    pub sre: Sre,
}

impl PolicyDocument {
    pub fn from_yaml(content: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(content).map_err(|e| EngineError::Document {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The document's root strategy, if it names one.
    pub fn root_strategy(&self) -> Result<Option<Strategy>, EngineError> {
        Ok(self.strategy.as_deref().map(Strategy::parse).transpose()?)
    }

    /// Build and validate every top-level policy.
    pub fn build_policies(&self) -> Result<Vec<Box<dyn Policy>>, EngineError> {
        self.policies.iter().map(PolicySpec::build).collect()
    }

    /// Build a ready-to-run engine from this document.
    pub fn build_engine(
        &self,
        warehouse: Arc<Warehouse>,
        config: EngineConfig,
    ) -> Result<DecisionEngine, EngineError> {
        let strategy = self
            .root_strategy()?
            .or(config.strategy)
            .unwrap_or_default();
        let mut engine = DecisionEngine::with_config(warehouse, config).with_strategy(strategy);
        for policy in self.build_policies()? {
            engine.add_boxed_policy(policy)?;
        }
        tracing::info!(
            policies = engine.policy_count(),
            %strategy,
            "policy document loaded"
        );
        Ok(engine)
    }
}

impl PolicySpec {
    pub fn name(&self) -> &str {
        match self {
            PolicySpec::Composite(c) => &c.name,
            PolicySpec::Leaf(l) => &l.name,
        }
    }

    fn build(&self) -> Result<Box<dyn Policy>, EngineError> {
        match self {
            PolicySpec::Leaf(leaf) => {
                let mut filter = AcceptFilter::signatures(leaf.accept.as_slice())?;
                if let Some(kind) = leaf.kind {
                    filter = filter.only(kind);
                }
                let policy = SrePolicy::new(leaf.name.clone(), leaf.sre.clone()).with_filter(filter);
                policy.validate()?;
                Ok(Box::new(policy))
            }
            PolicySpec::Composite(composite) => {
                if composite.children.is_empty() {
                    return Err(EngineError::Document {
                        reason: format!("composite policy '{}' has no children", composite.name),
                    });
                }
                let strategy = Strategy::parse(composite.strategy.as_deref().unwrap_or_default())?;
                let mut node = CompositePolicy::new(composite.name.clone(), strategy);
                for child in &composite.children {
                    node.push(child.build()?);
                }
                Ok(Box::new(node))
            }
        }
    }
}
