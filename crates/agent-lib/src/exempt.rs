//! Tag-based exemption from idle shutdown

use std::collections::HashMap;
use tracing::warn;

/// Tag key that exempts a database instance from idle shutdown.
pub const RDS_IDLE_EXEMPT: &str = "RDS_IDLE_EXEMPT";

/// Tag key that exempts a VPC endpoint from teardown.
pub const VPCENDPOINTS_IDLE_EXEMPT: &str = "VPCENDPOINTS_IDLE_EXEMPT";

/// Decides whether a resource is exempt from idle shutdown based on its
/// attached tags.
///
/// Key comparison is case-insensitive and only the value `TRUE` (any
/// case) exempts. An absent key means "not exempt": a resource is fair
/// game for shutdown unless someone explicitly marked it.
#[derive(Debug, Clone)]
pub struct ExemptionPolicy {
    tag_key: &'static str,
}

impl ExemptionPolicy {
    pub fn for_instances() -> Self {
        Self {
            tag_key: RDS_IDLE_EXEMPT,
        }
    }

    pub fn for_endpoints() -> Self {
        Self {
            tag_key: VPCENDPOINTS_IDLE_EXEMPT,
        }
    }

    pub fn is_exempt(&self, tags: &HashMap<String, String>) -> bool {
        for (key, value) in tags {
            if !key.eq_ignore_ascii_case(self.tag_key) {
                continue;
            }
            if value.eq_ignore_ascii_case("TRUE") {
                return true;
            }
            if !value.eq_ignore_ascii_case("FALSE") {
                warn!(
                    tag_key = %key,
                    tag_value = %value,
                    "Unrecognized exemption tag value, treating as not exempt"
                );
            }
            return false;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_absent_key_is_not_exempt() {
        let policy = ExemptionPolicy::for_instances();
        assert!(!policy.is_exempt(&tags(&[])));
        assert!(!policy.is_exempt(&tags(&[("Team", "data"), ("Env", "prod")])));
    }

    #[test]
    fn test_true_value_any_case_is_exempt() {
        let policy = ExemptionPolicy::for_instances();
        assert!(policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "TRUE")])));
        assert!(policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "true")])));
        assert!(policy.is_exempt(&tags(&[("rds_idle_exempt", "True")])));
    }

    #[test]
    fn test_false_value_any_case_is_not_exempt() {
        let policy = ExemptionPolicy::for_instances();
        assert!(!policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "FALSE")])));
        assert!(!policy.is_exempt(&tags(&[("Rds_Idle_Exempt", "false")])));
    }

    #[test]
    fn test_unrecognized_value_is_not_exempt() {
        let policy = ExemptionPolicy::for_instances();
        assert!(!policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "yes")])));
        assert!(!policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "")])));
    }

    #[test]
    fn test_endpoint_policy_uses_its_own_key() {
        let policy = ExemptionPolicy::for_endpoints();
        assert!(policy.is_exempt(&tags(&[("VPCENDPOINTS_IDLE_EXEMPT", "true")])));
        assert!(!policy.is_exempt(&tags(&[("RDS_IDLE_EXEMPT", "true")])));
    }
}
