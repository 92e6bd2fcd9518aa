use proptest::prelude::*;

use qfc::{sharding::shard_for, transaction::Transaction};

proptest! {
    /// Routing is a pure function of the first hex nibble.
    #[test]
    fn routing_depends_only_on_the_first_nibble(
        nibble in 0u32..16,
        rest in "[0-9a-f]{0,12}",
        shard_count in 1u32..16,
    ) {
        let address = format!("{:x}{}", nibble, rest);
        let shard = shard_for(&address, shard_count).unwrap();
        prop_assert_eq!(shard, nibble % shard_count);

        // Any other address sharing the nibble routes identically.
        let sibling = format!("{:x}ffff", nibble);
        prop_assert_eq!(shard_for(&sibling, shard_count).unwrap(), shard);
    }

    /// Addresses that do not start with a hex digit never route.
    #[test]
    fn non_hex_addresses_are_rejected(rest in "[0-9a-f]{0,8}") {
        for prefix in ['g', 'z', 'N', '-'] {
            let address = format!("{}{}", prefix, rest);
            prop_assert!(shard_for(&address, 4).is_err());
        }
    }

    /// Content hashes agree exactly when the content fields agree.
    #[test]
    fn content_addressing(
        amount in 0.01f64..1_000_000.0,
        timestamp in 0i64..2_000_000_000,
    ) {
        let mut a = Transaction::new("a1".to_string(), "b2".to_string(), amount).unwrap();
        let mut b = Transaction::new("a1".to_string(), "b2".to_string(), amount).unwrap();
        a.timestamp = timestamp;
        b.timestamp = timestamp;
        prop_assert_eq!(a.calculate_hash(), b.calculate_hash());

        b.fee += 0.5;
        prop_assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    /// The total cost is always amount plus the 1% fee.
    #[test]
    fn total_cost_follows_the_fee_policy(amount in 0.01f64..1_000_000.0) {
        let tx = Transaction::new("a1".to_string(), "b2".to_string(), amount).unwrap();
        prop_assert!((tx.total_cost() - amount * 1.01).abs() < 1e-6);
    }
}
