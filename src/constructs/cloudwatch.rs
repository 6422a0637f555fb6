use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{LogicalId, Resource};

use super::ecs::{Cluster, FargateService};
use super::elb::LoadBalancer;

/// Default metric period in seconds
pub const DEFAULT_PERIOD_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Average,
    Sum,
}

impl Statistic {
    fn as_str(self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<(String, Value)>,
    pub statistic: Statistic,
    pub period_secs: u32,
}

impl Metric {
    fn ecs_service(metric_name: &str, cluster: &Cluster, service: &FargateService) -> Self {
        Self {
            namespace: "AWS/ECS".to_string(),
            metric_name: metric_name.to_string(),
            dimensions: vec![
                ("ClusterName".to_string(), cluster.id.reference()),
                ("ServiceName".to_string(), service.service_name()),
            ],
            statistic: Statistic::Average,
            period_secs: DEFAULT_PERIOD_SECS,
        }
    }

    pub fn service_cpu_utilization(cluster: &Cluster, service: &FargateService) -> Self {
        Self::ecs_service("CPUUtilization", cluster, service)
    }

    pub fn service_memory_utilization(cluster: &Cluster, service: &FargateService) -> Self {
        Self::ecs_service("MemoryUtilization", cluster, service)
    }

    /// 5xx responses returned by the targets behind `load_balancer`
    pub fn target_5xx_count(load_balancer: &LoadBalancer) -> Self {
        Self {
            namespace: "AWS/ApplicationELB".to_string(),
            metric_name: "HTTPCode_Target_5XX_Count".to_string(),
            dimensions: vec![("LoadBalancer".to_string(), load_balancer.full_name())],
            statistic: Statistic::Sum,
            period_secs: DEFAULT_PERIOD_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlarmProps {
    pub alarm_name: String,
    pub description: String,
    pub metric: Metric,
    pub threshold: u32,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
}

pub fn add_alarm(stack: &mut Stack, id: &str, props: &AlarmProps) -> Result<LogicalId, SynthError> {
    if props.evaluation_periods == 0 {
        return Err(SynthError::InvalidAlarm {
            alarm: props.alarm_name.clone(),
            reason: "at least one evaluation period is required".to_string(),
        });
    }
    if props.datapoints_to_alarm == 0 || props.datapoints_to_alarm > props.evaluation_periods {
        return Err(SynthError::InvalidAlarm {
            alarm: props.alarm_name.clone(),
            reason: format!(
                "{} datapoints cannot be collected in {} evaluation periods",
                props.datapoints_to_alarm, props.evaluation_periods
            ),
        });
    }

    let metric = &props.metric;
    let dimensions: Vec<Value> = metric
        .dimensions
        .iter()
        .map(|(name, value)| json!({ "Name": name, "Value": value }))
        .collect();

    stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::CloudWatch::Alarm",
            json!({
                "AlarmName": props.alarm_name,
                "AlarmDescription": props.description,
                "ComparisonOperator": "GreaterThanOrEqualToThreshold",
                "Threshold": props.threshold,
                "EvaluationPeriods": props.evaluation_periods,
                "DatapointsToAlarm": props.datapoints_to_alarm,
                "Namespace": metric.namespace,
                "MetricName": metric.metric_name,
                "Dimensions": dimensions,
                "Statistic": metric.statistic.as_str(),
                "Period": metric.period_secs,
            }),
        ),
    )
}
