//! Operator-facing output declarations
//!
//! Placeholders use `${<id>.<attribute>}` so the declaration-time template
//! pass (`{{ }}`) leaves them alone.

use serde::{Deserialize, Serialize};

/// How an output value is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBody {
    /// Free-form string with placeholders
    Template(String),
    /// Two-hop SSH command through a bastion
    SshProxy {
        bastion: String,
        target: String,
        #[serde(default)]
        key_path: Option<String>,
    },
}

/// Declared output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDecl {
    pub name: String,
    pub body: OutputBody,
    #[serde(default)]
    pub description: Option<String>,
}

impl OutputDecl {
    pub fn template(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: OutputBody::Template(template.into()),
            description: None,
        }
    }

    pub fn ssh_proxy(
        name: impl Into<String>,
        bastion: impl Into<String>,
        target: impl Into<String>,
        key_path: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            body: OutputBody::SshProxy {
                bastion: bastion.into(),
                target: target.into(),
                key_path,
            },
            description: None,
        }
    }
}

/// Output with its final template string, carried by the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl OutputTemplate {
    pub fn placeholders(&self) -> Vec<Placeholder> {
        scan_placeholders(&self.template)
    }
}

/// One `${id.attribute}` occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub descriptor_id: String,
    pub attribute: String,
    /// Byte range of the whole `${...}` in the template
    pub start: usize,
    pub end: usize,
}

/// Composes the two-hop SSH one-liner
pub fn ssh_proxy_command(
    key_path: &str,
    bastion_user: &str,
    bastion_id: &str,
    target_user: &str,
    target_id: &str,
) -> String {
    format!(
        "ssh -o ProxyCommand=\"ssh -i {key} -W %h:%p {bastion_user}@${{{bastion_id}.public_ip}}\" -i {key} {target_user}@${{{target_id}.private_ip}}",
        key = key_path,
    )
}

/// Finds every `${id.attribute}` in `template`
///
/// Text that opens with `${` but is not of that shape is left as literal text.
pub fn scan_placeholders(template: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = template[cursor..].find("${") {
        let start = cursor + rel;
        let body_start = start + 2;
        let Some(close) = template[body_start..].find('}') else {
            break;
        };
        let end = body_start + close + 1;
        let body = template[body_start..body_start + close].trim();

        if let Some((id, attribute)) = body.rsplit_once('.')
            && is_valid_id(id)
            && is_valid_id(attribute)
        {
            found.push(Placeholder {
                descriptor_id: id.to_string(),
                attribute: attribute.to_string(),
                start,
                end,
            });
            cursor = end;
        } else {
            cursor = body_start;
        }
    }

    found
}

/// Letters, digits, `-` and `_`; the only ids a placeholder can name
pub fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_placeholders() {
        let found = scan_placeholders("http://${web-lb.dns_name}:${ web-lb.port }/");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].descriptor_id, "web-lb");
        assert_eq!(found[0].attribute, "dns_name");
        assert_eq!(found[1].attribute, "port");
    }

    #[test]
    fn test_scan_ignores_shell_variables() {
        // `${HOME}` has no attribute part, `%h:%p` is ssh syntax
        let found = scan_placeholders("echo ${HOME} && ssh -W %h:%p ${bastion.public_ip}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].descriptor_id, "bastion");
    }

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("web-lb_2"));
        assert!(!is_valid_id("web.bastion"));
        assert!(!is_valid_id("web lb"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(scan_placeholders("value ${bastion.public_ip").is_empty());
    }

    #[test]
    fn test_ssh_proxy_command() {
        let cmd = ssh_proxy_command("./custody.pem", "ec2-user", "bastion", "ubuntu", "server");
        assert_eq!(
            cmd,
            "ssh -o ProxyCommand=\"ssh -i ./custody.pem -W %h:%p ec2-user@${bastion.public_ip}\" -i ./custody.pem ubuntu@${server.private_ip}"
        );

        let template = OutputTemplate {
            name: "SshCommand".to_string(),
            template: cmd,
            description: None,
        };
        let ids: Vec<_> = template
            .placeholders()
            .into_iter()
            .map(|p| p.descriptor_id)
            .collect();
        assert_eq!(ids, vec!["bastion", "server"]);
    }
}
