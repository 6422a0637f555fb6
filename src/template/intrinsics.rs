// CloudFormation intrinsic functions and pseudo parameters

use serde_json::{json, Value};

pub const ACCOUNT_ID: &str = "AWS::AccountId";
pub const PARTITION: &str = "AWS::Partition";
pub const REGION: &str = "AWS::Region";
pub const URL_SUFFIX: &str = "AWS::URLSuffix";

/// `{"Ref": name}` for a logical id, parameter, or pseudo parameter
pub fn reference(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{"Fn::Sub": template}` with `${AWS::...}` style placeholders
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// Availability zones of the stack's region
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// Shorthand for a literal string part inside `join`
pub fn lit(value: &str) -> Value {
    Value::String(value.to_string())
}

/// ARN of an AWS managed IAM policy, partition-aware
pub fn managed_policy_arn(policy_name: &str) -> Value {
    join(
        "",
        vec![
            lit("arn:"),
            reference(PARTITION),
            lit(&format!(":iam::aws:policy/{}", policy_name)),
        ],
    )
}
