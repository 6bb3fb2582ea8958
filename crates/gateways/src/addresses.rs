/// Addresses maps each logical downstream service to a dialable
/// `host:port`. It deserializes from configuration; defaults point at the
/// well-known local ports of a single-node deployment. There is no DNS
/// discovery in the core.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Addresses {
    pub anchor: String,
    pub unified_model: String,
    pub mesh: String,
    pub transformation: String,
    pub stream: String,
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            anchor: "127.0.0.1:50055".to_string(),
            unified_model: "127.0.0.1:50056".to_string(),
            mesh: "127.0.0.1:50057".to_string(),
            transformation: "127.0.0.1:50058".to_string(),
            stream: "127.0.0.1:50059".to_string(),
        }
    }
}

impl Addresses {
    /// Resolve a logical service name to its `host:port`.
    pub fn resolve(&self, service: &str) -> Option<&str> {
        match service {
            "anchor" => Some(&self.anchor),
            "unifiedmodel" => Some(&self.unified_model),
            "mesh" => Some(&self.mesh),
            "transformation" => Some(&self.transformation),
            "stream" => Some(&self.stream),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Addresses;

    #[test]
    fn resolves_known_services_only() {
        let addresses = Addresses::default();
        assert_eq!(addresses.resolve("anchor"), Some("127.0.0.1:50055"));
        assert_eq!(addresses.resolve("unifiedmodel"), Some("127.0.0.1:50056"));
        assert_eq!(addresses.resolve("core"), None);
    }

    #[test]
    fn deserializes_partial_overrides() {
        let addresses: Addresses =
            serde_json::from_str(r#"{"anchor": "anchor.internal:9000"}"#).unwrap();
        assert_eq!(addresses.anchor, "anchor.internal:9000");
        assert_eq!(addresses.mesh, "127.0.0.1:50057");
    }
}
