use crate::models::Role;

/// Leader iff the kubelet and kube-state-metrics run on the same node
///
/// Plain string equality, so two empty affinities also make a leader.
pub fn resolve_role(kubelet_node_ip: &str, ksm_node_ip: &str) -> Role {
    if kubelet_node_ip == ksm_node_ip {
        Role::Leader
    } else {
        Role::Follower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_node_is_leader() {
        assert_eq!(resolve_role("10.0.0.1", "10.0.0.1"), Role::Leader);
    }

    #[test]
    fn test_other_node_is_follower() {
        assert_eq!(resolve_role("10.0.0.1", "10.0.0.2"), Role::Follower);
        assert_eq!(resolve_role("10.0.0.1", ""), Role::Follower);
    }

    #[test]
    fn test_empty_affinities_are_equal() {
        assert_eq!(resolve_role("", ""), Role::Leader);
    }
}
