use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{LogicalId, Resource};

/// Smallest and largest request limits a rate-based rule accepts
const RATE_LIMIT_RANGE: (u32, u32) = (10, 2_000_000_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regional,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Regional => "REGIONAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
    Block,
}

impl RuleAction {
    fn render(self) -> Value {
        match self {
            RuleAction::Allow => json!({ "Allow": {} }),
            RuleAction::Block => json!({ "Block": {} }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatement {
    /// Apply `action` to source IPs exceeding `limit` requests per 5 minutes
    RateLimitPerIp { limit: u32, action: RuleAction },
    /// Vendor-managed rule group evaluated with its own actions
    ManagedRuleGroup { vendor: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAclRule {
    pub name: String,
    pub priority: u32,
    pub statement: RuleStatement,
}

impl WebAclRule {
    pub fn rate_limit(name: &str, priority: u32, limit: u32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            statement: RuleStatement::RateLimitPerIp {
                limit,
                action: RuleAction::Block,
            },
        }
    }

    /// AWS managed group; the rule takes the group's name
    pub fn aws_managed(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            statement: RuleStatement::ManagedRuleGroup {
                vendor: "AWS".to_string(),
                name: name.to_string(),
            },
        }
    }

    fn render(&self) -> Value {
        let mut rule = json!({
            "Name": self.name,
            "Priority": self.priority,
            "VisibilityConfig": visibility(&self.name),
        });
        match &self.statement {
            RuleStatement::RateLimitPerIp { limit, action } => {
                rule["Action"] = action.render();
                rule["Statement"] = json!({
                    "RateBasedStatement": { "AggregateKeyType": "IP", "Limit": limit },
                });
            }
            RuleStatement::ManagedRuleGroup { vendor, name } => {
                rule["OverrideAction"] = json!({ "None": {} });
                rule["Statement"] = json!({
                    "ManagedRuleGroupStatement": { "Name": name, "VendorName": vendor },
                });
            }
        }
        rule
    }
}

fn visibility(metric_name: &str) -> Value {
    json!({
        "CloudWatchMetricsEnabled": true,
        "MetricName": metric_name,
        "SampledRequestsEnabled": true,
    })
}

#[derive(Debug, Clone)]
pub struct WebAclProps {
    pub name: String,
    pub scope: Scope,
    pub default_action: RuleAction,
    pub rules: Vec<WebAclRule>,
}

impl WebAclProps {
    pub fn validate(&self) -> Result<(), SynthError> {
        let invalid = |reason: String| SynthError::InvalidWebAcl {
            acl: self.name.clone(),
            reason,
        };

        let mut priorities = BTreeSet::new();
        let mut names = BTreeSet::new();
        for rule in &self.rules {
            if !priorities.insert(rule.priority) {
                return Err(invalid(format!("priority {} is used twice", rule.priority)));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(invalid(format!("rule name '{}' is used twice", rule.name)));
            }
            if let RuleStatement::RateLimitPerIp { limit, .. } = rule.statement {
                let (low, high) = RATE_LIMIT_RANGE;
                if limit < low || limit > high {
                    return Err(invalid(format!(
                        "rate limit {} of '{}' is outside {}..={}",
                        limit, rule.name, low, high
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rules in evaluation order
    pub fn ordered_rules(&self) -> Vec<&WebAclRule> {
        let mut rules: Vec<&WebAclRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.priority);
        rules
    }
}

#[derive(Debug, Clone)]
pub struct WebAcl {
    pub id: LogicalId,
}

impl WebAcl {
    pub fn arn(&self) -> Value {
        self.id.attr("Arn")
    }
}

pub fn add_web_acl(stack: &mut Stack, id: &str, props: &WebAclProps) -> Result<WebAcl, SynthError> {
    props.validate()?;

    let rules: Vec<Value> = props.ordered_rules().into_iter().map(WebAclRule::render).collect();
    let id = stack.add_resource(
        id,
        Resource::new(
            "AWS::WAFv2::WebACL",
            json!({
                "Name": props.name,
                "Scope": props.scope.as_str(),
                "DefaultAction": props.default_action.render(),
                "VisibilityConfig": visibility(&props.name),
                "Rules": rules,
            }),
        ),
    )?;
    Ok(WebAcl { id })
}

/// Attach `web_acl` to a regional resource such as a load balancer
pub fn add_web_acl_association(
    stack: &mut Stack,
    id: &str,
    web_acl: &WebAcl,
    resource_arn: Value,
) -> Result<LogicalId, SynthError> {
    stack.add_resource(
        id,
        Resource::new(
            "AWS::WAFv2::WebACLAssociation",
            json!({
                "ResourceArn": resource_arn,
                "WebACLArn": web_acl.arn(),
            }),
        ),
    )
}
