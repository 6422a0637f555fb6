use serde_json::{json, Value};
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::{get_azs, select};
use crate::template::{LogicalId, Resource};

pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// An IPv4 network block such as `10.0.0.0/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(s: &str) -> Result<Self, SynthError> {
        let invalid = || SynthError::InvalidNetwork(format!("'{}' is not an IPv4 CIDR block", s));

        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        let mask = Self::mask(prefix);
        if u32::from(addr) & !mask != 0 {
            return Err(SynthError::InvalidNetwork(format!(
                "'{}' has host bits set",
                s
            )));
        }

        Ok(Self {
            network: addr,
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }

    /// Split into `count` equally sized blocks.
    ///
    /// The block size is the largest one that fits `count` blocks, i.e. the
    /// prefix grows by ceil(log2(count)) bits. Blocks are handed out from the
    /// bottom of the range; any remainder stays unallocated.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>, SynthError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let extra_bits = (count as u32).next_power_of_two().trailing_zeros() as u8;
        let prefix = self.prefix + extra_bits;
        if prefix > 28 {
            return Err(SynthError::InvalidNetwork(format!(
                "{} cannot hold {} subnets of at least /28",
                self, count
            )));
        }

        let block_size = 1u32 << (32 - prefix);
        let base = u32::from(self.network);
        Ok((0..count as u32)
            .map(|i| Ipv4Cidr {
                network: Ipv4Addr::from(base + i * block_size),
                prefix,
            })
            .collect())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct VpcProps {
    pub vpc_name: String,
    pub cidr: String,
    pub max_azs: usize,
    pub nat_gateways: usize,
}

/// A VPC with one public and one private subnet per availability zone.
///
/// Public subnets route to an internet gateway and host the NAT gateways;
/// private subnets route to the NAT gateway in their own zone, or to the
/// first NAT gateway when their zone has none.
#[derive(Debug, Clone)]
pub struct Vpc {
    pub id: LogicalId,
    pub public_subnets: Vec<LogicalId>,
    pub private_subnets: Vec<LogicalId>,
    /// Default routes of the public subnets; internet-facing resources depend on them
    pub internet_routes: Vec<LogicalId>,
}

impl Vpc {
    pub fn public_subnet_refs(&self) -> Vec<Value> {
        self.public_subnets.iter().map(LogicalId::reference).collect()
    }

    pub fn private_subnet_refs(&self) -> Vec<Value> {
        self.private_subnets.iter().map(LogicalId::reference).collect()
    }
}

fn name_tags(name: &str, subnet_type: Option<&str>) -> Value {
    let mut tags = vec![json!({ "Key": "Name", "Value": name })];
    if let Some(subnet_type) = subnet_type {
        tags.push(json!({ "Key": "aws-cdk:subnet-type", "Value": subnet_type }));
    }
    Value::Array(tags)
}

pub fn add_vpc(stack: &mut Stack, id: &str, props: &VpcProps) -> Result<Vpc, SynthError> {
    if props.max_azs == 0 {
        return Err(SynthError::InvalidNetwork(
            "at least one availability zone is required".to_string(),
        ));
    }
    if props.nat_gateways == 0 || props.nat_gateways > props.max_azs {
        return Err(SynthError::InvalidNetwork(format!(
            "NAT gateway count must be between 1 and {} (got {})",
            props.max_azs, props.nat_gateways
        )));
    }

    let blocks = Ipv4Cidr::parse(&props.cidr)?.split(props.max_azs * 2)?;
    let (public_blocks, private_blocks) = blocks.split_at(props.max_azs);

    let vpc_id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": props.cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tags(&props.vpc_name, None),
            }),
        ),
    )?;

    let igw = stack.add_resource(
        &format!("{}/IGW", id),
        Resource::new(
            "AWS::EC2::InternetGateway",
            json!({ "Tags": name_tags(&props.vpc_name, None) }),
        ),
    )?;
    let igw_attachment = stack.add_resource(
        &format!("{}/VPCGW", id),
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": vpc_id.reference(),
                "InternetGatewayId": igw.reference(),
            }),
        ),
    )?;

    let mut public_subnets = Vec::new();
    let mut internet_routes = Vec::new();
    let mut nat_gateways = Vec::new();

    for (index, block) in public_blocks.iter().enumerate() {
        let subnet_path = format!("{}/PublicSubnet{}", id, index + 1);
        let subnet_name = format!("{}/PublicSubnet{}", stack.path_of(id), index + 1);

        let subnet = stack.add_resource(
            &format!("{}/Subnet", subnet_path),
            Resource::new(
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": vpc_id.reference(),
                    "AvailabilityZone": select(index, get_azs()),
                    "CidrBlock": block.to_string(),
                    "MapPublicIpOnLaunch": true,
                    "Tags": name_tags(&subnet_name, Some("Public")),
                }),
            ),
        )?;
        let route_table = stack.add_resource(
            &format!("{}/RouteTable", subnet_path),
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({
                    "VpcId": vpc_id.reference(),
                    "Tags": name_tags(&subnet_name, None),
                }),
            ),
        )?;
        let association = stack.add_resource(
            &format!("{}/RouteTableAssociation", subnet_path),
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": route_table.reference(),
                    "SubnetId": subnet.reference(),
                }),
            ),
        )?;
        let default_route = stack.add_resource(
            &format!("{}/DefaultRoute", subnet_path),
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": route_table.reference(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": igw.reference(),
                }),
            )
            .depends_on(&igw_attachment),
        )?;

        if index < props.nat_gateways {
            let eip = stack.add_resource(
                &format!("{}/EIP", subnet_path),
                Resource::new(
                    "AWS::EC2::EIP",
                    json!({
                        "Domain": "vpc",
                        "Tags": name_tags(&subnet_name, None),
                    }),
                ),
            )?;
            let nat = stack.add_resource(
                &format!("{}/NATGateway", subnet_path),
                Resource::new(
                    "AWS::EC2::NatGateway",
                    json!({
                        "SubnetId": subnet.reference(),
                        "AllocationId": eip.attr("AllocationId"),
                        "Tags": name_tags(&subnet_name, None),
                    }),
                )
                .depends_on(&default_route)
                .depends_on(&association),
            )?;
            nat_gateways.push(nat);
        }

        public_subnets.push(subnet);
        internet_routes.push(default_route);
    }

    let mut private_subnets = Vec::new();
    for (index, block) in private_blocks.iter().enumerate() {
        let subnet_path = format!("{}/PrivateSubnet{}", id, index + 1);
        let subnet_name = format!("{}/PrivateSubnet{}", stack.path_of(id), index + 1);
        let nat = nat_gateways.get(index).unwrap_or(&nat_gateways[0]).clone();

        let subnet = stack.add_resource(
            &format!("{}/Subnet", subnet_path),
            Resource::new(
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": vpc_id.reference(),
                    "AvailabilityZone": select(index, get_azs()),
                    "CidrBlock": block.to_string(),
                    "MapPublicIpOnLaunch": false,
                    "Tags": name_tags(&subnet_name, Some("Private")),
                }),
            ),
        )?;
        let route_table = stack.add_resource(
            &format!("{}/RouteTable", subnet_path),
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({
                    "VpcId": vpc_id.reference(),
                    "Tags": name_tags(&subnet_name, None),
                }),
            ),
        )?;
        stack.add_resource(
            &format!("{}/RouteTableAssociation", subnet_path),
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": route_table.reference(),
                    "SubnetId": subnet.reference(),
                }),
            ),
        )?;
        stack.add_resource(
            &format!("{}/DefaultRoute", subnet_path),
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": route_table.reference(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": nat.reference(),
                }),
            ),
        )?;

        private_subnets.push(subnet);
    }

    Ok(Vpc {
        id: vpc_id,
        public_subnets,
        private_subnets,
        internet_routes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackEnv;

    fn props(max_azs: usize, nat_gateways: usize) -> VpcProps {
        VpcProps {
            vpc_name: "test-vpc".to_string(),
            cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs,
            nat_gateways,
        }
    }

    fn stack() -> Stack {
        Stack::new("NetStack", StackEnv::new(None, "ap-northeast-1"), "d")
    }

    #[test]
    fn test_split_four_subnets_uses_slash_18() {
        let blocks = Ipv4Cidr::parse("10.0.0.0/16").unwrap().split(4).unwrap();
        let rendered: Vec<String> = blocks.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
    }

    #[test]
    fn test_split_six_subnets_uses_slash_19() {
        let blocks = Ipv4Cidr::parse("10.0.0.0/16").unwrap().split(6).unwrap();
        assert_eq!(blocks.len(), 6);
        assert!(blocks.iter().all(|b| b.prefix == 19));
        assert_eq!(blocks[5].to_string(), "10.0.160.0/19");
    }

    #[test]
    fn test_parse_rejects_host_bits_and_garbage() {
        assert!(Ipv4Cidr::parse("10.0.0.1/16").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.0").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.0/33").is_err());
        assert!(Ipv4Cidr::parse("not-a-cidr/8").is_err());
    }

    #[test]
    fn test_two_zones_one_shared_nat() {
        let mut stack = stack();
        let vpc = add_vpc(&mut stack, "Vpc", &props(2, 1)).unwrap();
        assert_eq!(vpc.public_subnets.len(), 2);
        assert_eq!(vpc.private_subnets.len(), 2);

        let template = stack.template();
        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::EIP"), 1);

        // Both private routes point at the single NAT gateway
        let (nat_id, _) = template.resources_of_type("AWS::EC2::NatGateway").next().unwrap();
        let nat_ref = serde_json::json!({ "Ref": nat_id });
        let private_routes: Vec<_> = template
            .resources_of_type("AWS::EC2::Route")
            .filter(|(_, r)| r.property("NatGatewayId").is_some())
            .collect();
        assert_eq!(private_routes.len(), 2);
        assert!(private_routes
            .iter()
            .all(|(_, r)| r.property("NatGatewayId") == Some(&nat_ref)));
    }

    #[test]
    fn test_three_zones_three_nats_route_within_zone() {
        let mut stack = stack();
        add_vpc(&mut stack, "Vpc", &props(3, 3)).unwrap();
        assert_eq!(stack.template().count_of_type("AWS::EC2::NatGateway"), 3);

        let distinct: std::collections::BTreeSet<String> = stack
            .template()
            .resources_of_type("AWS::EC2::Route")
            .filter_map(|(_, r)| r.property("NatGatewayId"))
            .map(|v| v.to_string())
            .collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_invalid_nat_count_is_rejected() {
        let mut stack = stack();
        assert!(add_vpc(&mut stack, "Vpc", &props(2, 3)).is_err());
        let mut stack = self::stack();
        assert!(add_vpc(&mut stack, "Vpc", &props(2, 0)).is_err());
    }
}
