use rand::{distributions::Alphanumeric, distributions::DistString, thread_rng};

/// Generates a random alphanumeric string, used for session tokens
pub fn random_string(length: usize) -> String {
    Alphanumeric.sample_string(&mut thread_rng(), length)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_string() {
        let a = random_string(32);
        let b = random_string(32);

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
