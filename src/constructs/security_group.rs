use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{LogicalId, Resource};

/// Source of inbound traffic
#[derive(Debug, Clone)]
pub enum Peer {
    AnyIpv4,
    SecurityGroup(LogicalId),
}

#[derive(Debug, Clone)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: u16,
    pub description: String,
}

impl IngressRule {
    pub fn tcp_from_anywhere(port: u16, description: &str) -> Self {
        Self {
            peer: Peer::AnyIpv4,
            port,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroupProps {
    pub group_name: String,
    pub vpc: LogicalId,
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub id: LogicalId,
    path: String,
}

impl SecurityGroup {
    pub fn group_id(&self) -> Value {
        self.id.attr("GroupId")
    }
}

pub fn add_security_group(
    stack: &mut Stack,
    id: &str,
    props: &SecurityGroupProps,
) -> Result<SecurityGroup, SynthError> {
    let mut properties = json!({
        "GroupDescription": stack.path_of(id),
        "GroupName": props.group_name,
        "VpcId": props.vpc.reference(),
        "SecurityGroupIngress": [],
    });
    if props.allow_all_outbound {
        properties["SecurityGroupEgress"] = json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }]);
    }

    let logical_id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new("AWS::EC2::SecurityGroup", properties),
    )?;

    Ok(SecurityGroup {
        id: logical_id,
        path: id.to_string(),
    })
}

/// Allow inbound TCP traffic on `rule.port`.
///
/// CIDR peers are written inline into the group; security-group peers get a
/// standalone ingress resource so that two groups can reference each other.
pub fn add_ingress_rule(
    stack: &mut Stack,
    group: &SecurityGroup,
    rule: &IngressRule,
) -> Result<(), SynthError> {
    match &rule.peer {
        Peer::AnyIpv4 => {
            let logical_id = group.id.as_str().to_string();
            let resource = stack_resource_mut(stack, &logical_id)?;
            let entry = json!({
                "CidrIp": "0.0.0.0/0",
                "Description": rule.description,
                "FromPort": rule.port,
                "IpProtocol": "tcp",
                "ToPort": rule.port,
            });
            if let Some(ingress) = resource.properties["SecurityGroupIngress"].as_array_mut() {
                ingress.push(entry);
            }
        }
        Peer::SecurityGroup(source) => {
            stack.add_resource(
                &format!("{}/from{}:{}", group.path, source, rule.port),
                Resource::new(
                    "AWS::EC2::SecurityGroupIngress",
                    json!({
                        "Description": rule.description,
                        "FromPort": rule.port,
                        "GroupId": group.group_id(),
                        "IpProtocol": "tcp",
                        "SourceSecurityGroupId": source.attr("GroupId"),
                        "ToPort": rule.port,
                    }),
                ),
            )?;
        }
    }
    Ok(())
}

fn stack_resource_mut<'a>(
    stack: &'a mut Stack,
    logical_id: &str,
) -> Result<&'a mut Resource, SynthError> {
    stack.resource_mut(logical_id).ok_or_else(|| {
        SynthError::InvalidNetwork(format!("security group '{}' is not declared", logical_id))
    })
}
