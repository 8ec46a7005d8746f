//! Container naming convention for managed workloads.
//!
//! Every workload this system provisions lives in a container named
//! `vllm-<sanitized model id>`, where every character outside `[A-Za-z0-9]`
//! is replaced with `-`. The derivation is a pure function of the model id.
//!
//! Sanitization is lossy: `org/model` and `org-model` map to the same name.
//! Two such models alias one container; the runtime gateway labels each
//! container with its original model id so an alias is at least visible.

/// Prefix shared by every managed container name.
pub const NAMESPACE_TAG: &str = "vllm-";

/// Separator substituted for non-alphanumeric characters.
const SEPARATOR: char = '-';

/// Derive the container name for a model id.
pub fn container_name(model_id: &str) -> String {
    let mut name = String::with_capacity(NAMESPACE_TAG.len() + model_id.len());
    name.push_str(NAMESPACE_TAG);
    name.extend(
        model_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { SEPARATOR }),
    );
    name
}

/// Whether a string already follows the managed naming convention.
pub fn is_managed_name(name: &str) -> bool {
    name.starts_with(NAMESPACE_TAG)
}

/// Normalize a spindown target (model id or container name) to a container name.
pub fn normalize_target(identifier: &str) -> String {
    if is_managed_name(identifier) {
        identifier.to_string()
    } else {
        container_name(identifier)
    }
}

/// Best-effort model id recovered from a container name (sanitized form).
pub fn model_id_from_name(name: &str) -> Option<&str> {
    name.strip_prefix(NAMESPACE_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = container_name("Qwen/Qwen2.5-0.5B-Instruct");
        let b = container_name("Qwen/Qwen2.5-0.5B-Instruct");
        assert_eq!(a, b);
        assert_eq!(a, "vllm-Qwen-Qwen2-5-0-5B-Instruct");
    }

    #[test]
    fn non_ascii_is_replaced_per_char() {
        assert_eq!(container_name("añb"), "vllm-a-b");
        assert_eq!(container_name(""), "vllm-");
    }

    #[test]
    fn distinct_ids_can_alias() {
        assert_eq!(container_name("org/model"), container_name("org-model"));
    }

    #[test]
    fn normalize_keeps_managed_names() {
        assert_eq!(normalize_target("vllm-org-model"), "vllm-org-model");
        assert_eq!(normalize_target("org/model"), "vllm-org-model");
    }

    #[test]
    fn model_id_from_name_strips_tag() {
        assert_eq!(model_id_from_name("vllm-org-model"), Some("org-model"));
        assert_eq!(model_id_from_name("postgres"), None);
    }
}
