//! Parsing of `output` and `ssh-output` nodes

use super::{property_string, required, required_id, string_arguments};
use crate::error::Result;
use crate::model::OutputDecl;
use kdl::KdlNode;

/// `output "LoadBalancerDns" "${web-lb.dns_name}" description="..."`
pub fn parse_output(node: &KdlNode) -> Result<OutputDecl> {
    let name = required_id(node)?;
    let template = string_arguments(node).into_iter().nth(1);
    let template = required(template, &format!("output '{}'", name), "a template")?;

    let mut output = OutputDecl::template(name, template);
    output.description = property_string(node, "description");
    Ok(output)
}

/// `ssh-output "SshCommand" bastion="bastion" target="server" key="./custody.pem"`
pub fn parse_ssh_output(node: &KdlNode) -> Result<OutputDecl> {
    let name = required_id(node)?;
    let owner = format!("ssh-output '{}'", name);
    let bastion = required(property_string(node, "bastion"), &owner, "bastion=")?;
    let target = required(property_string(node, "target"), &owner, "target=")?;

    let mut output = OutputDecl::ssh_proxy(name, bastion, target, property_string(node, "key"));
    output.description = property_string(node, "description");
    Ok(output)
}
