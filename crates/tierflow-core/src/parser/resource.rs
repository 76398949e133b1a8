//! Parsing of resource descriptor nodes

use super::{
    first_bool, first_port, first_string, port_value, property_string, required,
    required_id, string_arguments,
};
use crate::error::{DeclarationError, Result};
use crate::model::{
    CertificateSpec, CertificateValidation, InstanceSpec, KeyReferenceSpec, ListenerSpec,
    LoadBalancerSpec, Redirect, ResourceDescriptor, ResourceSpec, RoleSpec, TargetGroupSpec,
};
use kdl::KdlNode;

/// Parse any descriptor node, dispatching on its name
pub fn parse_resource(node: &KdlNode) -> Result<ResourceDescriptor> {
    let id = required_id(node)?;
    let owner = format!("{} '{}'", node.name().value(), id);

    let spec = match node.name().value() {
        "instance" => ResourceSpec::Instance(parse_instance(node, &owner)?),
        "load-balancer" => ResourceSpec::LoadBalancer(parse_load_balancer(node, &owner)?),
        "target-group" => ResourceSpec::TargetGroup(parse_target_group(node, &owner)?),
        "listener" => ResourceSpec::Listener(parse_listener(node, &owner)?),
        "certificate" => ResourceSpec::Certificate(parse_certificate(node, &owner)?),
        "role" => ResourceSpec::Role(parse_role(node, &owner)?),
        "key" => ResourceSpec::KeyReference(KeyReferenceSpec {
            key_name: property_string(node, "name").unwrap_or_else(|| id.clone()),
        }),
        other => {
            return Err(DeclarationError::InvalidConfig(format!(
                "unknown resource kind '{}'",
                other
            )));
        }
    };

    Ok(ResourceDescriptor::new(id, spec))
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|c| c.nodes())
}

/// ```kdl
/// instance "server" {
///     zone "private-1"
///     access-group "priv"
///     role "ec2-role"
///     key "aegis"
///     instance-type "t3.micro"
///     image "ubuntu-24.04"
///     user "ubuntu"
///     user-data {
///         - "apt-get update -y"
///     }
/// }
/// ```
fn parse_instance(node: &KdlNode, owner: &str) -> Result<InstanceSpec> {
    let mut zone = None;
    let mut access_group = None;
    let mut spec = InstanceSpec::default();

    for child in children(node) {
        match child.name().value() {
            "zone" => zone = first_string(child),
            "access-group" | "access_group" => access_group = first_string(child),
            "role" => spec.role = first_string(child),
            "key" => spec.key = first_string(child),
            "instance-type" | "instance_type" => spec.instance_type = first_string(child),
            "image" => spec.image = first_string(child),
            "user" | "login-user" => spec.login_user = first_string(child),
            "user-data" | "user_data" => {
                // inline arguments first, then one command per child node
                spec.user_data.extend(string_arguments(child));
                spec.user_data.extend(children(child).filter_map(first_string));
            }
            _ => {}
        }
    }

    spec.zone = required(zone, owner, "zone")?;
    spec.access_group = required(access_group, owner, "access-group")?;
    Ok(spec)
}

fn parse_load_balancer(node: &KdlNode, owner: &str) -> Result<LoadBalancerSpec> {
    let mut spec = LoadBalancerSpec::default();

    for child in children(node) {
        match child.name().value() {
            "zones" | "zone" => spec.zones.extend(string_arguments(child)),
            "access-group" | "access_group" => spec.access_group = first_string(child),
            "internet-facing" | "internet_facing" => {
                spec.internet_facing = first_bool(child).unwrap_or(true);
            }
            "redirect" => spec.redirects.push(parse_redirect(child, owner)?),
            _ => {}
        }
    }

    if spec.zones.is_empty() {
        return Err(DeclarationError::InvalidConfig(format!(
            "{} requires at least one zone",
            owner
        )));
    }
    Ok(spec)
}

/// `redirect from=80 to=443`, protocols default to HTTP -> HTTPS
fn parse_redirect(node: &KdlNode, owner: &str) -> Result<Redirect> {
    let port = |key: &str| -> Result<u16> {
        let value = node.get(key).ok_or_else(|| {
            DeclarationError::InvalidConfig(format!("{}: redirect requires {}=", owner, key))
        })?;
        port_value(value, owner)
    };

    Ok(Redirect {
        from_port: port("from")?,
        from_protocol: property_string(node, "from-protocol").unwrap_or_else(|| "HTTP".to_string()),
        to_port: port("to")?,
        to_protocol: property_string(node, "to-protocol").unwrap_or_else(|| "HTTPS".to_string()),
    })
}

fn parse_target_group(node: &KdlNode, owner: &str) -> Result<TargetGroupSpec> {
    let mut protocol = None;
    let mut port = None;
    let mut spec = TargetGroupSpec::default();

    for child in children(node) {
        match child.name().value() {
            "protocol" => protocol = first_string(child),
            "port" => port = Some(first_port(child, owner)?),
            "targets" | "target" => spec.targets.extend(string_arguments(child)),
            "health-check-path" | "health_check_path" => {
                spec.health_check_path = first_string(child);
            }
            _ => {}
        }
    }

    spec.protocol = required(protocol, owner, "protocol")?;
    spec.port = port.ok_or_else(|| DeclarationError::InvalidConfig(format!("{} requires port", owner)))?;
    Ok(spec)
}

fn parse_listener(node: &KdlNode, owner: &str) -> Result<ListenerSpec> {
    let mut load_balancer = None;
    let mut port = None;
    let mut protocol = None;
    let mut target_group = None;
    let mut spec = ListenerSpec::default();

    for child in children(node) {
        match child.name().value() {
            "load-balancer" | "load_balancer" => load_balancer = first_string(child),
            "port" => port = Some(first_port(child, owner)?),
            "protocol" => protocol = first_string(child),
            "certificate" | "certificates" => spec.certificates.extend(string_arguments(child)),
            "target-group" | "default-target-group" => target_group = first_string(child),
            "open" => spec.open = first_bool(child).unwrap_or(true),
            _ => {}
        }
    }

    spec.load_balancer = required(load_balancer, owner, "load-balancer")?;
    spec.port = port.ok_or_else(|| DeclarationError::InvalidConfig(format!("{} requires port", owner)))?;
    spec.protocol = required(protocol, owner, "protocol")?;
    spec.default_target_group = required(target_group, owner, "target-group")?;
    Ok(spec)
}

fn parse_certificate(node: &KdlNode, owner: &str) -> Result<CertificateSpec> {
    let mut domain = None;
    let mut alternative_names = Vec::new();
    let mut validation = CertificateValidation::Dns;

    for child in children(node) {
        match child.name().value() {
            "domain" => domain = first_string(child),
            "alternative-names" | "alternative-name" | "san" => {
                alternative_names.extend(string_arguments(child));
            }
            "validation" => {
                validation = match first_string(child).as_deref() {
                    Some("dns") | Some("DNS") => CertificateValidation::Dns,
                    Some("email") | Some("EMAIL") => CertificateValidation::Email,
                    other => {
                        return Err(DeclarationError::InvalidConfig(format!(
                            "{}: unknown validation {:?}",
                            owner, other
                        )));
                    }
                };
            }
            _ => {}
        }
    }

    Ok(CertificateSpec {
        domain: required(domain, owner, "domain")?,
        alternative_names,
        validation,
    })
}

fn parse_role(node: &KdlNode, owner: &str) -> Result<RoleSpec> {
    let mut assumed_by = None;
    let mut managed_policies = Vec::new();

    for child in children(node) {
        match child.name().value() {
            "assumed-by" | "assumed_by" => assumed_by = first_string(child),
            "managed-policy" | "managed-policies" => {
                managed_policies.extend(string_arguments(child));
            }
            _ => {}
        }
    }

    Ok(RoleSpec {
        assumed_by: required(assumed_by, owner, "assumed-by")?,
        managed_policies,
    })
}
