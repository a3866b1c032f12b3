//! Instance name generation
//!
//! Every cluster gets a short random token. Master and node name prefixes are
//! derived from it and the workload type, and instance names append the
//! 1-based ordinal: `<token>-k8s-master-1`, `<token>-k8s-node-2`, ...

use rand::Rng;
use serde::Serialize;

use crate::config::WorkloadType;

/// Length of the random cluster token
pub const TOKEN_LENGTH: usize = 5;

/// Token alphabet: 36 symbols, lower case so names stay valid DNS labels
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random cluster token from the thread-local RNG
pub fn generate_token() -> String {
    generate_token_with(&mut rand::thread_rng(), TOKEN_LENGTH)
}

/// Generate a token of `len` symbols from the given random source
pub fn generate_token_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Role-scoped name prefixes for one cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prefixes {
    /// The random token both prefixes start with
    pub token: String,
    /// Prefix for master instance names
    pub master: String,
    /// Prefix for node instance names
    pub node: String,
}

impl Prefixes {
    /// Derive prefixes from an existing token
    ///
    /// Used to rebuild a manager's identity from a persisted token. Unknown
    /// workload types fall back to the bare token for both roles.
    pub fn for_token(token: impl Into<String>, workload: &WorkloadType) -> Self {
        let token = token.into();
        let (master, node) = match workload {
            WorkloadType::Kubernetes => (
                format!("{}-k8s-master", token),
                format!("{}-k8s-node", token),
            ),
            WorkloadType::OpenShift => (
                format!("{}-openshift-master", token),
                format!("{}-openshift-node", token),
            ),
            WorkloadType::Other(_) => (token.clone(), token.clone()),
        };
        Self {
            token,
            master,
            node,
        }
    }
}

/// Generate fresh prefixes for a new cluster
pub fn new_prefixes(workload: &WorkloadType) -> Prefixes {
    Prefixes::for_token(generate_token(), workload)
}

/// Generate fresh prefixes from the given random source
pub fn new_prefixes_with<R: Rng + ?Sized>(rng: &mut R, workload: &WorkloadType) -> Prefixes {
    Prefixes::for_token(generate_token_with(rng, TOKEN_LENGTH), workload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_kubernetes_suffixes() {
        let prefixes = Prefixes::for_token("ab12c", &WorkloadType::Kubernetes);
        assert_eq!(prefixes.master, "ab12c-k8s-master");
        assert_eq!(prefixes.node, "ab12c-k8s-node");
        assert_eq!(prefixes.token, "ab12c");
    }

    #[test]
    fn test_openshift_suffixes_are_case_insensitive() {
        let workload = WorkloadType::parse("OpenShift");
        let prefixes = Prefixes::for_token("zz9zz", &workload);
        assert_eq!(prefixes.master, "zz9zz-openshift-master");
        assert_eq!(prefixes.node, "zz9zz-openshift-node");

        let prefixes = Prefixes::for_token("zz9zz", &WorkloadType::parse("KUBERNETES"));
        assert_eq!(prefixes.master, "zz9zz-k8s-master");
    }

    /// Story: an unknown workload degrades to the bare token instead of failing
    #[test]
    fn story_unknown_workload_uses_raw_token_for_both_roles() {
        let prefixes = new_prefixes(&WorkloadType::parse("mesos"));
        assert_eq!(prefixes.master, prefixes.token);
        assert_eq!(prefixes.node, prefixes.token);
        assert_eq!(prefixes.token.len(), TOKEN_LENGTH);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = new_prefixes_with(&mut StdRng::seed_from_u64(7), &WorkloadType::Kubernetes);
        let b = new_prefixes_with(&mut StdRng::seed_from_u64(7), &WorkloadType::Kubernetes);
        assert_eq!(a, b);
    }

    /// 10,000 draws over 36^5 tokens: the expected number of colliding
    /// pairs is below one, so more than a handful means a broken source.
    #[test]
    fn test_prefixes_are_unique_across_many_draws() {
        const DRAWS: usize = 10_000;
        let mut seen = HashSet::with_capacity(DRAWS);
        let mut collisions = 0;
        for _ in 0..DRAWS {
            if !seen.insert(new_prefixes(&WorkloadType::Kubernetes).master) {
                collisions += 1;
            }
        }
        assert!(collisions <= 5, "{} collisions in {} draws", collisions, DRAWS);
    }

    #[test]
    fn test_concurrent_generation_draws_independent_tokens() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..100)
                        .map(|_| new_prefixes(&WorkloadType::OpenShift).token)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for token in handle.join().unwrap() {
                total += 1;
                all.insert(token);
            }
        }
        assert_eq!(total, 800);
        // 800 draws: a duplicate is a ~1 in 200 event, two would mean shared state
        assert!(all.len() >= 798);
    }
}
