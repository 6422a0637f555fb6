use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::{join, lit, sub};
use crate::template::{LogicalId, Resource};

use super::ecs::{Cluster, FargateService};
use super::elb::{LoadBalancer, TargetGroup};

const ECS_SCALING_ROLE: &str = "arn:${AWS::Partition}:iam::${AWS::AccountId}:role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService";

/// Daily schedule that raises the minimum task count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFloor {
    pub name: String,
    pub hour: u8,
    pub minute: u8,
    pub min_capacity: u32,
}

impl ScheduledFloor {
    pub fn daily(name: &str, hour: u8, minute: u8, min_capacity: u32) -> Self {
        Self {
            name: name.to_string(),
            hour,
            minute,
            min_capacity,
        }
    }

    /// Application Auto Scaling cron expression (UTC)
    pub fn cron(&self) -> String {
        format!("cron({} {} * * ? *)", self.minute, self.hour)
    }

    fn minute_of_day(&self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }
}

/// Replica bounds of a service plus its scheduled floors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityPlan {
    pub min: u32,
    pub max: u32,
    pub schedules: Vec<ScheduledFloor>,
}

impl CapacityPlan {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            schedules: Vec::new(),
        }
    }

    pub fn with_schedule(mut self, schedule: ScheduledFloor) -> Self {
        self.schedules.push(schedule);
        self
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        if self.max == 0 {
            return Err(SynthError::InvalidCapacity(
                "max capacity must be at least 1".to_string(),
            ));
        }
        if self.min > self.max {
            return Err(SynthError::InvalidCapacity(format!(
                "min capacity {} exceeds max capacity {}",
                self.min, self.max
            )));
        }

        let mut names = BTreeSet::new();
        let mut times = BTreeSet::new();
        for schedule in &self.schedules {
            if schedule.hour > 23 || schedule.minute > 59 {
                return Err(SynthError::InvalidSchedule(format!(
                    "'{}' runs at {:02}:{:02}, which is not a time of day",
                    schedule.name, schedule.hour, schedule.minute
                )));
            }
            if !names.insert(schedule.name.as_str()) {
                return Err(SynthError::InvalidSchedule(format!(
                    "schedule name '{}' is used twice",
                    schedule.name
                )));
            }
            if !times.insert(schedule.minute_of_day()) {
                return Err(SynthError::InvalidSchedule(format!(
                    "'{}' fires at the same time as another schedule",
                    schedule.name
                )));
            }
            if schedule.min_capacity > self.max {
                return Err(SynthError::InvalidCapacity(format!(
                    "schedule '{}' floor {} exceeds max capacity {}",
                    schedule.name, schedule.min_capacity, self.max
                )));
            }
        }
        Ok(())
    }

    /// Minimum task count in effect at `hour:minute`.
    ///
    /// The most recently fired schedule (wrapping to the previous day) is
    /// combined with the base minimum; the higher one wins, capped at max.
    #[cfg(test)]
    pub fn floor_at(&self, hour: u8, minute: u8) -> u32 {
        let now = u16::from(hour) * 60 + u16::from(minute);

        let latest = self
            .schedules
            .iter()
            .filter(|s| s.minute_of_day() <= now)
            .max_by_key(|s| s.minute_of_day())
            .or_else(|| self.schedules.iter().max_by_key(|s| s.minute_of_day()));

        let scheduled = latest.map(|s| s.min_capacity).unwrap_or(self.min);
        scheduled.max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct ScalableTarget {
    pub id: LogicalId,
    path: String,
}

/// Register the desired count of `service` with Application Auto Scaling
pub fn add_scalable_target(
    stack: &mut Stack,
    service_path: &str,
    cluster: &Cluster,
    service: &FargateService,
    plan: &CapacityPlan,
) -> Result<ScalableTarget, SynthError> {
    plan.validate()?;

    let mut properties = json!({
        "MinCapacity": plan.min,
        "MaxCapacity": plan.max,
        "ResourceId": join(
            "/",
            vec![lit("service"), cluster.id.reference(), service.service_name()],
        ),
        "RoleARN": sub(ECS_SCALING_ROLE),
        "ScalableDimension": "ecs:service:DesiredCount",
        "ServiceNamespace": "ecs",
    });
    if !plan.schedules.is_empty() {
        let actions: Vec<Value> = plan
            .schedules
            .iter()
            .map(|s| {
                json!({
                    "ScheduledActionName": s.name,
                    "Schedule": s.cron(),
                    "ScalableTargetAction": { "MinCapacity": s.min_capacity },
                })
            })
            .collect();
        properties["ScheduledActions"] = Value::Array(actions);
    }

    let path = format!("{}/TaskCount/Target", service_path);
    let id = stack.add_resource(
        &format!("{}/Resource", path),
        Resource::new("AWS::ApplicationAutoScaling::ScalableTarget", properties),
    )?;
    Ok(ScalableTarget { id, path })
}

/// Metric a target tracking policy holds at its target value
#[derive(Debug, Clone)]
pub enum TrackedMetric {
    CpuUtilization,
    RequestCountPerTarget {
        load_balancer: LoadBalancer,
        target_group: TargetGroup,
    },
}

impl TrackedMetric {
    fn render(&self) -> Value {
        match self {
            TrackedMetric::CpuUtilization => json!({
                "PredefinedMetricType": "ECSServiceAverageCPUUtilization",
            }),
            TrackedMetric::RequestCountPerTarget {
                load_balancer,
                target_group,
            } => json!({
                "PredefinedMetricType": "ALBRequestCountPerTarget",
                "ResourceLabel": join(
                    "/",
                    vec![load_balancer.full_name(), target_group.full_name()],
                ),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetTrackingProps {
    pub metric: TrackedMetric,
    pub target_value: u32,
    pub scale_in_cooldown_secs: Option<u32>,
    pub scale_out_cooldown_secs: Option<u32>,
}

pub fn add_target_tracking_policy(
    stack: &mut Stack,
    target: &ScalableTarget,
    id: &str,
    props: &TargetTrackingProps,
) -> Result<LogicalId, SynthError> {
    let mut configuration = json!({
        "PredefinedMetricSpecification": props.metric.render(),
        "TargetValue": props.target_value,
    });
    if let Some(cooldown) = props.scale_in_cooldown_secs {
        configuration["ScaleInCooldown"] = json!(cooldown);
    }
    if let Some(cooldown) = props.scale_out_cooldown_secs {
        configuration["ScaleOutCooldown"] = json!(cooldown);
    }

    let path = format!("{}/{}", target.path, id);
    let policy_name = LogicalId::from_path(&stack.path_of(&path));
    stack.add_resource(
        &format!("{}/Resource", path),
        Resource::new(
            "AWS::ApplicationAutoScaling::ScalingPolicy",
            json!({
                "PolicyName": policy_name.as_str(),
                "PolicyType": "TargetTrackingScaling",
                "ScalingTargetId": target.id.reference(),
                "TargetTrackingScalingPolicyConfiguration": configuration,
            }),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackEnv;

    fn business_hours() -> CapacityPlan {
        CapacityPlan::new(2, 10)
            .with_schedule(ScheduledFloor::daily("BusinessHoursScaling", 8, 0, 4))
            .with_schedule(ScheduledFloor::daily("AfterHoursScaling", 18, 0, 2))
    }

    #[test]
    fn test_cron_expression() {
        let schedule = ScheduledFloor::daily("BusinessHoursScaling", 8, 0, 4);
        assert_eq!(schedule.cron(), "cron(0 8 * * ? *)");
    }

    #[test]
    fn test_floor_follows_latest_schedule() {
        let plan = business_hours();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.floor_at(8, 0), 4);
        assert_eq!(plan.floor_at(12, 30), 4);
        assert_eq!(plan.floor_at(18, 0), 2);
        assert_eq!(plan.floor_at(23, 59), 2);
        // Before the first schedule of the day, yesterday's last one still applies
        assert_eq!(plan.floor_at(3, 0), 2);
    }

    #[test]
    fn test_floor_never_drops_below_base_min() {
        let plan = CapacityPlan::new(3, 10).with_schedule(ScheduledFloor::daily("Night", 22, 0, 1));
        assert_eq!(plan.floor_at(23, 0), 3);
        assert_eq!(CapacityPlan::new(1, 4).floor_at(12, 0), 1);
    }

    #[test]
    fn test_invalid_plans_are_rejected() {
        assert!(CapacityPlan::new(5, 4).validate().is_err());
        assert!(CapacityPlan::new(0, 0).validate().is_err());
        assert!(CapacityPlan::new(2, 10)
            .with_schedule(ScheduledFloor::daily("Peak", 8, 0, 11))
            .validate()
            .is_err());
        assert!(CapacityPlan::new(2, 10)
            .with_schedule(ScheduledFloor::daily("Late", 24, 0, 3))
            .validate()
            .is_err());
        assert!(CapacityPlan::new(2, 10)
            .with_schedule(ScheduledFloor::daily("A", 8, 0, 3))
            .with_schedule(ScheduledFloor::daily("B", 8, 0, 4))
            .validate()
            .is_err());
    }

    #[test]
    fn test_scalable_target_and_request_policy() {
        let mut stack = Stack::new("S", StackEnv::new(None, "ap-northeast-1"), "d");
        let cluster = Cluster {
            id: LogicalId::from_path("Cluster/Resource"),
        };
        let service = FargateService {
            id: LogicalId::from_path("Service/Service"),
        };
        let target =
            add_scalable_target(&mut stack, "Service", &cluster, &service, &business_hours())
                .unwrap();

        let resource = stack.resource(&target.id).unwrap();
        assert_eq!(resource.properties["ScalableDimension"], "ecs:service:DesiredCount");
        assert_eq!(resource.properties["MinCapacity"], 2);
        assert_eq!(resource.properties["MaxCapacity"], 10);
        let actions = resource.properties["ScheduledActions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["ScalableTargetAction"]["MinCapacity"], 4);

        let policy = add_target_tracking_policy(
            &mut stack,
            &target,
            "RequestScaling",
            &TargetTrackingProps {
                metric: TrackedMetric::RequestCountPerTarget {
                    load_balancer: LoadBalancer {
                        id: LogicalId::from_path("LB/Resource"),
                    },
                    target_group: TargetGroup {
                        id: LogicalId::from_path("LB/Listener/Target/Resource"),
                    },
                },
                target_value: 800,
                scale_in_cooldown_secs: None,
                scale_out_cooldown_secs: None,
            },
        )
        .unwrap();
        let config = &stack.resource(&policy).unwrap().properties
            ["TargetTrackingScalingPolicyConfiguration"];
        assert_eq!(config["TargetValue"], 800);
        assert_eq!(
            config["PredefinedMetricSpecification"]["PredefinedMetricType"],
            "ALBRequestCountPerTarget"
        );
        assert!(config.get("ScaleInCooldown").is_none());
    }
}
