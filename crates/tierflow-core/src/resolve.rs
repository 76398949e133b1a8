//! Output resolution
//!
//! Substitutes backend-assigned attributes into the plan's output templates.

use crate::error::ResolutionError;
use crate::model::{HandleSet, OutputTemplate};
use crate::plan::ProvisioningPlan;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Output ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub name: String,
    pub value: String,
    /// Descriptor of the last placeholder, the final hop of a composed command
    #[serde(default)]
    pub source_descriptor_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Resolve every output of `plan`, in declaration order
///
/// All placeholders are checked before any substitution happens, so a
/// failure never leaves half-resolved values behind.
pub fn resolve(
    plan: &ProvisioningPlan,
    handles: &HandleSet,
) -> Result<Vec<ResolvedOutput>, ResolutionError> {
    for output in &plan.outputs {
        validate(plan, output, handles)?;
    }

    let resolved = plan
        .outputs
        .iter()
        .map(|output| ResolvedOutput {
            name: output.name.clone(),
            value: substitute(output, handles),
            source_descriptor_id: output.placeholders().pop().map(|p| p.descriptor_id),
            description: output.description.clone(),
        })
        .collect::<Vec<_>>();

    debug!(outputs = resolved.len(), "Outputs resolved");
    Ok(resolved)
}

fn validate(
    plan: &ProvisioningPlan,
    output: &OutputTemplate,
    handles: &HandleSet,
) -> Result<(), ResolutionError> {
    for placeholder in output.placeholders() {
        if plan.position(&placeholder.descriptor_id).is_none() {
            return Err(ResolutionError::UnknownDescriptor {
                output: output.name.clone(),
                descriptor_id: placeholder.descriptor_id,
            });
        }
        let handle =
            handles
                .get(&placeholder.descriptor_id)
                .ok_or_else(|| ResolutionError::MissingHandle {
                    descriptor_id: placeholder.descriptor_id.clone(),
                })?;
        if handle.attribute(&placeholder.attribute).is_none() {
            return Err(ResolutionError::MissingAttribute {
                descriptor_id: placeholder.descriptor_id,
                attribute: placeholder.attribute,
            });
        }
    }
    Ok(())
}

/// Placeholders must already be validated
fn substitute(output: &OutputTemplate, handles: &HandleSet) -> String {
    let mut value = String::with_capacity(output.template.len());
    let mut cursor = 0;
    for placeholder in output.placeholders() {
        value.push_str(&output.template[cursor..placeholder.start]);
        if let Some(attr) = handles
            .get(&placeholder.descriptor_id)
            .and_then(|h| h.attribute(&placeholder.attribute))
        {
            value.push_str(attr);
        }
        cursor = placeholder.end;
    }
    value.push_str(&output.template[cursor..]);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ATTR_PRIVATE_IP, ATTR_PUBLIC_IP, EntityKind, Handle, StackConfig};
    use crate::plan::PlanStep;

    fn plan(outputs: Vec<OutputTemplate>) -> ProvisioningPlan {
        let step = |index, id: &str| PlanStep {
            index,
            id: id.to_string(),
            kind: EntityKind::Instance,
            depends_on: vec![],
        };
        ProvisioningPlan {
            stack: StackConfig::named("t"),
            steps: vec![step(0, "bastion"), step(1, "server")],
            outputs,
        }
    }

    fn output(name: &str, template: &str) -> OutputTemplate {
        OutputTemplate {
            name: name.to_string(),
            template: template.to_string(),
            description: None,
        }
    }

    fn handles() -> HandleSet {
        [
            Handle::new("bastion", "i-0001").with_attribute(ATTR_PUBLIC_IP, "203.0.113.10"),
            Handle::new("server", "i-0002").with_attribute(ATTR_PRIVATE_IP, "10.0.1.10"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_resolve_in_declaration_order() {
        let plan = plan(vec![
            output("BastionPublicIp", "${bastion.public_ip}"),
            output(
                "SshCommand",
                "ssh -W %h:%p ec2-user@${bastion.public_ip} ubuntu@${server.private_ip}",
            ),
            output("ServerId", "${server.id}"),
        ]);

        let resolved = resolve(&plan, &handles()).unwrap();
        let values: Vec<_> = resolved.iter().map(|o| o.value.as_str()).collect();
        let sources: Vec<_> = resolved
            .iter()
            .map(|o| o.source_descriptor_id.as_deref())
            .collect();
        assert_eq!(
            values,
            vec![
                "203.0.113.10",
                "ssh -W %h:%p ec2-user@203.0.113.10 ubuntu@10.0.1.10",
                "i-0002",
            ]
        );
        assert_eq!(sources, vec![Some("bastion"), Some("server"), Some("server")]);
    }

    #[test]
    fn test_missing_handle() {
        let mut handles = handles();
        handles.remove("server");
        let plan = plan(vec![output("Ip", "${server.private_ip}")]);

        assert_eq!(
            resolve(&plan, &handles).unwrap_err(),
            ResolutionError::MissingHandle {
                descriptor_id: "server".to_string()
            }
        );
    }

    #[test]
    fn test_missing_attribute() {
        let plan = plan(vec![output("Ip", "${server.public_ip}")]);
        assert_eq!(
            resolve(&plan, &handles()).unwrap_err(),
            ResolutionError::MissingAttribute {
                descriptor_id: "server".to_string(),
                attribute: "public_ip".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_descriptor() {
        let plan = plan(vec![output("Dns", "${web-lb.dns_name}")]);
        assert!(matches!(
            resolve(&plan, &handles()).unwrap_err(),
            ResolutionError::UnknownDescriptor { descriptor_id, .. } if descriptor_id == "web-lb"
        ));
    }

    #[test]
    fn test_literal_text_is_untouched() {
        let plan = plan(vec![output("Home", "cd ${HOME} && echo done")]);
        let resolved = resolve(&plan, &handles()).unwrap();
        assert_eq!(resolved[0].value, "cd ${HOME} && echo done");
        assert_eq!(resolved[0].source_descriptor_id, None);
    }
}
