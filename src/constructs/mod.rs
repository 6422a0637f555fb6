// Typed builders for the AWS resources the stacks declare.
//
// Each builder takes the owning stack, a construct id, and a props struct,
// registers one or more resources, and returns a handle whose methods yield
// the `Ref`/`Fn::GetAtt` values other builders wire together.

pub mod autoscaling;
pub mod cdn;
pub mod cloudwatch;
pub mod dns;
pub mod ecr;
pub mod ecs;
pub mod elb;
pub mod iam;
pub mod logs;
pub mod network;
pub mod security_group;
pub mod waf;
