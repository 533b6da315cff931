//! Static capability manifests printed by `--json`.

use std::io::Write;

use serde::Serialize;

use crate::exit::{io_error, CliError, CliResult, INTERNAL};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentManifest {
    pub name: &'static str,
    pub description: &'static str,
    pub inports: Vec<PortManifest>,
    pub outports: Vec<PortManifest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortManifest {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl ComponentManifest {
    pub fn console() -> Self {
        Self {
            name: "core/console",
            description: "Prints every received IP to stdout, brackets as [ and ]",
            inports: vec![PortManifest {
                name: "IN",
                kind: "all",
                description: "IPs to print",
                required: true,
            }],
            outports: Vec::new(),
        }
    }

    pub fn template() -> Self {
        Self {
            name: "core/template",
            description: "Renders the configured template against each JSON object packet",
            inports: vec![
                PortManifest {
                    name: "TPL",
                    kind: "string",
                    description: "Template source; the first one that compiles is used",
                    required: true,
                },
                PortManifest {
                    name: "IN",
                    kind: "json",
                    description: "JSON objects to render",
                    required: true,
                },
            ],
            outports: vec![PortManifest {
                name: "OUT",
                kind: "string",
                description: "Rendered text",
                required: true,
            }],
        }
    }

    pub fn to_json(&self) -> CliResult<String> {
        serde_json::to_string(self)
            .map_err(|err| CliError::new(INTERNAL, format!("manifest encoding failed: {err}")))
    }

    /// Write the manifest as one JSON line on stdout.
    pub fn print(&self) -> CliResult<()> {
        let json = self.to_json()?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{json}").map_err(|err| io_error("write manifest", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_manifest_lists_ports() {
        let json = ComponentManifest::template().to_json().expect("manifest should encode");
        let value: serde_json::Value = serde_json::from_str(&json).expect("manifest is JSON");

        assert_eq!(value["name"], "core/template");
        let inports: Vec<&str> = value["inports"]
            .as_array()
            .expect("inports array")
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert_eq!(inports, ["TPL", "IN"]);
        assert_eq!(value["outports"][0]["type"], "string");
    }

    #[test]
    fn console_manifest_has_no_outputs() {
        let manifest = ComponentManifest::console();
        assert_eq!(manifest.inports.len(), 1);
        assert!(manifest.outports.is_empty());
    }
}
