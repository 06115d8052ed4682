//! Routing and fault-injection rule models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single routing or action rule attached to a destination service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub id: String,
    pub priority: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub destination: String,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_: Option<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn is_route(&self) -> bool {
        self.route.is_some()
    }

    pub fn is_action(&self) -> bool {
        !self.actions.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Request selection criteria of a rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub backends: Vec<Backend>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uri {
    pub path: String,
    pub prefix: String,
    pub prefix_rewrite: String,
}

/// A weighted routing target
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backend {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<Uri>,
    pub weight: f64,
    /// Request timeout in seconds
    pub timeout: f64,
    pub retries: u32,
}

/// Action applied to matching requests, tagged by the `action` field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Delay {
        probability: f64,
        #[serde(default)]
        tags: Vec<String>,
        /// Delay in seconds
        duration: f64,
    },
    Abort {
        probability: f64,
        #[serde(default)]
        tags: Vec<String>,
        return_code: u16,
    },
    Trace {
        #[serde(default)]
        tags: Vec<String>,
        log_key: String,
        log_value: String,
    },
}

impl Action {
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::Delay { .. } => "delay",
            Action::Abort { .. } => "abort",
            Action::Trace { .. } => "trace",
        }
    }
}

/// Rules together with the controller revision they were read at
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub revision: i64,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            revision: -1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RuleType {
    #[default]
    Any,
    /// Rules carrying a route
    Route,
    /// Rules carrying at least one action
    Action,
}

/// Filter applied to sets of rules; empty fields are ignored
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleFilter {
    /// Acceptable rule IDs
    pub ids: Vec<String>,
    /// Tags every passing rule must carry
    pub tags: Vec<String>,
    /// Acceptable rule destinations
    pub destinations: Vec<String>,
    pub rule_type: RuleType,
}

impl RuleFilter {
    pub fn for_destination(destination: impl Into<String>) -> Self {
        Self {
            destinations: vec![destination.into()],
            ..Default::default()
        }
    }

    pub fn with_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    /// Whether no rule would ever be filtered out
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.tags.is_empty()
            && self.destinations.is_empty()
            && self.rule_type == RuleType::Any
    }

    pub fn matches(&self, rule: &Rule) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&rule.id) {
            return false;
        }

        match self.rule_type {
            RuleType::Action if !rule.is_action() => return false,
            RuleType::Route if !rule.is_route() => return false,
            _ => {}
        }

        if !self.destinations.is_empty() && !self.destinations.contains(&rule.destination) {
            return false;
        }

        self.tags.iter().all(|t| rule.tags.contains(t))
    }

    /// Returns the rules passing the filter, in their original order
    pub fn apply(&self, rules: &[Rule]) -> Vec<Rule> {
        if self.is_empty() {
            return rules.to_vec();
        }

        rules
            .iter()
            .filter(|rule| self.matches(rule))
            .cloned()
            .collect()
    }
}
