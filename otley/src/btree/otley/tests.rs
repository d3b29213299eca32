use super::*;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Citizen {
    id: i32,
    age: i32,
    name: [u8; 11],
}

impl Citizen {
    fn new(id: i32, age: i32, name: &str) -> Self {
        let mut buf = [0u8; 11];
        let bytes = name.as_bytes();
        let len = bytes.len().min(buf.len() - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { id, age, name: buf }
    }
}

fn property(dir: &str, index_capacity: i32, data_capacity: i32, unique: bool) -> Property {
    Property::new(
        dir,
        "metadata.json",
        "index.dat",
        index_capacity,
        data_capacity,
        unique,
    )
    .expect("valid property")
}

async fn citizen_tree(
    dir: &str,
    index_capacity: i32,
    data_capacity: i32,
    unique: bool,
) -> Otley<i32, Citizen> {
    Otley::try_new(property(dir, index_capacity, data_capacity, unique), |c: &Citizen| c.id)
        .await
        .expect("creates tree")
}

fn ids(records: &[Citizen]) -> Vec<i32> {
    records.iter().map(|c| c.id).collect()
}

fn cleanup(dir: &str) {
    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[tokio::test]
async fn it_creates_tree() {
    let dir = "create.idx";
    let tree = citizen_tree(dir, 5, 5, true).await;
    assert!(std::path::Path::new("create.idx/metadata.json").exists());
    assert!(std::path::Path::new("create.idx/index.dat").exists());
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Empty);
    cleanup(dir);
}

#[tokio::test]
async fn it_opens_tree() {
    let dir = "open.idx";
    let tree = citizen_tree(dir, 5, 5, true).await;
    tree.insert(Citizen::new(1, 30, "ada")).await.expect("insert worked");
    drop(tree);

    let tree = citizen_tree(dir, 5, 5, true).await;
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Data);
    assert!(tree.contains(&1).await);
    cleanup(dir);
}

#[tokio::test]
async fn it_keeps_persisted_capacities_on_reopen() {
    let dir = "reopen_capacities.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;
    for i in 1..=20 {
        tree.insert(Citizen::new(i, 20 + i, "u")).await.expect("insert worked");
    }
    drop(tree);

    // The capacities passed on reopen lose to the persisted document.
    let tree = citizen_tree(dir, 9, 9, false).await;
    {
        let loaded = tree.property.lock().await;
        assert_eq!(loaded.max_index_capacity, 4);
        assert_eq!(loaded.max_data_capacity, 4);
        assert!(loaded.unique_key);
    }
    assert_eq!(tree.count().await.expect("count worked"), 20);
    assert_eq!(ids(&tree.search(&7).await.expect("search worked")), vec![7]);
    cleanup(dir);
}

#[tokio::test]
async fn it_searches_empty_tree() {
    let dir = "search_empty.idx";
    let tree = citizen_tree(dir, 5, 5, true).await;

    let err = tree.search(&42).await.expect_err("nothing to find");
    assert!(matches!(
        err.downcast_ref::<OtleyError>(),
        Some(OtleyError::KeyNotFound)
    ));
    let err = tree.remove(&42).await.expect_err("nothing to remove");
    assert!(matches!(
        err.downcast_ref::<OtleyError>(),
        Some(OtleyError::KeyNotFound)
    ));
    cleanup(dir);
}

#[tokio::test]
async fn it_range_scans_empty_tree() {
    let dir = "range_empty.idx";
    let tree = citizen_tree(dir, 5, 5, true).await;

    assert!(tree.between(&1, &10).await.expect("between worked").is_empty());
    assert!(tree.above(&1).await.expect("above worked").is_empty());
    assert!(tree.below(&10).await.expect("below worked").is_empty());
    cleanup(dir);
}

#[tokio::test]
async fn it_round_trips_a_record() {
    let dir = "round_trip.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;

    let ada = Citizen::new(7, 36, "ada");
    tree.insert(ada).await.expect("insert worked");

    let found = tree.search(&7).await.expect("search worked");
    assert_eq!(found, vec![ada]);
    cleanup(dir);
}

#[tokio::test]
async fn it_rejects_repeated_keys() {
    let dir = "repeated.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;

    tree.insert(Citizen::new(7, 36, "ada")).await.expect("insert worked");
    let err = tree
        .insert(Citizen::new(7, 99, "imposter"))
        .await
        .expect_err("duplicate must be rejected");
    assert!(matches!(
        err.downcast_ref::<OtleyError>(),
        Some(OtleyError::RepeatedKey)
    ));

    // The original record is untouched.
    let found = tree.search(&7).await.expect("search worked");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].age, 36);
    cleanup(dir);
}

#[tokio::test]
async fn it_allows_duplicate_keys_when_not_unique() {
    let dir = "duplicates.idx";
    let tree = citizen_tree(dir, 4, 4, false).await;

    tree.insert(Citizen::new(7, 36, "ada")).await.expect("insert worked");
    tree.insert(Citizen::new(7, 81, "grace")).await.expect("insert worked");

    let found = tree.search(&7).await.expect("search worked");
    assert_eq!(found.len(), 2);
    cleanup(dir);
}

#[tokio::test]
async fn it_scans_duplicate_runs_across_pages() {
    let dir = "duplicate_run.idx";
    let tree = citizen_tree(dir, 3, 3, false).await;

    for age in 0..7 {
        tree.insert(Citizen::new(5, age, "clone")).await.expect("insert worked");
    }
    tree.insert(Citizen::new(1, 50, "low")).await.expect("insert worked");
    tree.insert(Citizen::new(9, 60, "high")).await.expect("insert worked");

    assert_eq!(tree.search(&5).await.expect("search worked").len(), 7);
    assert_eq!(tree.between(&5, &5).await.expect("between worked").len(), 7);
    tree.verify().await.expect("chain is ordered");
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_transitions_root_kinds() {
    let dir = "root_transitions.idx";
    let tree = citizen_tree(dir, 3, 3, true).await;

    assert_eq!(tree.property.lock().await.root_kind, RootKind::Empty);

    tree.insert(Citizen::new(1, 21, "u")).await.expect("insert worked");
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Data);

    // One more record than a single page holds forces the first height
    // increase.
    for i in 2..=4 {
        tree.insert(Citizen::new(i, 20 + i, "u")).await.expect("insert worked");
    }
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Index);

    // Shrinking back down reverses the transitions.
    for i in (2..=4).rev() {
        tree.remove(&i).await.expect("remove worked");
    }
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Data);

    tree.remove(&1).await.expect("remove worked");
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Empty);
    assert!(tree.between(&1, &10).await.expect("between worked").is_empty());

    // An emptied tree accepts records again.
    tree.insert(Citizen::new(8, 28, "u")).await.expect("insert worked");
    assert_eq!(tree.property.lock().await.root_kind, RootKind::Data);
    assert!(tree.contains(&8).await);
    cleanup(dir);
}

#[tokio::test]
async fn it_scans_between_bounds() {
    let dir = "between_bounds.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;

    for i in 1..=10 {
        tree.insert(Citizen::new(i, 20 + i, "u")).await.expect("insert worked");
    }

    assert_eq!(
        ids(&tree.between(&3, &7).await.expect("between worked")),
        vec![3, 4, 5, 6, 7]
    );
    assert_eq!(
        ids(&tree.above(&8).await.expect("above worked")),
        vec![8, 9, 10]
    );
    assert_eq!(
        ids(&tree.below(&2).await.expect("below worked")),
        vec![1, 2]
    );
    // Bounds which fall between keys behave the same way.
    assert_eq!(
        ids(&tree.between(&11, &20).await.expect("between worked")),
        Vec::<i32>::new()
    );
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_removes_scattered_keys() {
    let dir = "scattered.idx";
    let tree = citizen_tree(dir, 3, 3, true).await;

    for i in [5, 3, 8, 1, 9, 2, 7, 4, 6] {
        tree.insert(Citizen::new(i, 20 + i, "u")).await.expect("insert worked");
    }

    let found = tree.search(&5).await.expect("search worked");
    assert_eq!(ids(&found), vec![5]);

    tree.remove(&5).await.expect("remove worked");
    let err = tree.search(&5).await.expect_err("key is gone");
    assert!(matches!(
        err.downcast_ref::<OtleyError>(),
        Some(OtleyError::KeyNotFound)
    ));
    assert_eq!(
        ids(&tree.above(&0).await.expect("above worked")),
        vec![1, 2, 3, 4, 6, 7, 8, 9]
    );
    tree.verify().await.expect("chain is ordered");
    cleanup(dir);
}

#[tokio::test]
async fn it_preserves_order_for_any_insertion_order() {
    let first_dir = "order_first.idx";
    let second_dir = "order_second.idx";
    let first = citizen_tree(first_dir, 3, 3, true).await;
    let second = citizen_tree(second_dir, 3, 3, true).await;

    let mut keys: Vec<i32> = (1..=50).collect();
    keys.shuffle(&mut rand::thread_rng());
    for i in &keys {
        first.insert(Citizen::new(*i, 20, "u")).await.expect("insert worked");
    }
    keys.shuffle(&mut rand::thread_rng());
    for i in &keys {
        second.insert(Citizen::new(*i, 20, "u")).await.expect("insert worked");
    }

    // Physical page boundaries may differ; the key sequence may not.
    let expected: Vec<i32> = (1..=50).collect();
    assert_eq!(ids(&first.above(&0).await.expect("above worked")), expected);
    assert_eq!(ids(&second.above(&0).await.expect("above worked")), expected);
    cleanup(first_dir);
    cleanup(second_dir);
}

#[tokio::test]
async fn it_inserts_in_reverse_order() {
    let dir = "reverse.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;

    for i in (1..=100).rev() {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }
    for i in 1..=100 {
        assert!(tree.contains(&i).await);
    }
    assert_eq!(tree.count().await.expect("count worked"), 100);
    tree.verify().await.expect("chain is ordered");
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_borrows_from_the_right_sibling() {
    let dir = "borrow_right.idx";
    let tree = citizen_tree(dir, 3, 3, true).await;

    // Leaves settle as [1,2] [3,4] [5].
    for i in 1..=5 {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }

    // Empty the leftmost leaf: its only sibling is to the right.
    tree.remove(&1).await.expect("remove worked");
    tree.remove(&2).await.expect("remove worked");

    assert_eq!(ids(&tree.above(&0).await.expect("above worked")), vec![3, 4, 5]);
    tree.verify().await.expect("chain is ordered");
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_borrows_from_the_left_sibling() {
    let dir = "borrow_left.idx";
    let tree = citizen_tree(dir, 3, 3, true).await;

    // Leaves settle as [1,2] [3,4] [5].
    for i in 1..=5 {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }

    // Empty the rightmost leaf: both siblings are to its left.
    tree.remove(&5).await.expect("remove worked");

    assert_eq!(ids(&tree.above(&0).await.expect("above worked")), vec![1, 2, 3, 4]);
    tree.verify().await.expect("chain is ordered");
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_merges_down_to_a_single_leaf() {
    let dir = "merge_down.idx";
    let tree = citizen_tree(dir, 3, 3, true).await;

    for i in 1..=5 {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }
    for i in 1..=4 {
        tree.remove(&i).await.expect("remove worked");
        assert_eq!(tree.count().await.expect("count worked"), (5 - i) as usize);
        tree.verify().await.expect("chain is ordered");
    }

    assert_eq!(tree.property.lock().await.root_kind, RootKind::Data);
    assert_eq!(ids(&tree.above(&0).await.expect("above worked")), vec![5]);
    cleanup(dir);
}

#[tokio::test]
async fn it_counts_and_contains() {
    let dir = "count_contains.idx";
    let tree = citizen_tree(dir, 4, 4, true).await;

    assert_eq!(tree.count().await.expect("count worked"), 0);
    for i in 1..=9 {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }
    assert_eq!(tree.count().await.expect("count worked"), 9);
    assert!(tree.contains(&4).await);
    assert!(!tree.contains(&40).await);

    tree.remove(&4).await.expect("remove worked");
    assert_eq!(tree.count().await.expect("count worked"), 8);
    assert!(!tree.contains(&4).await);
    cleanup(dir);
}

#[tokio::test]
async fn it_orders_with_a_custom_comparator() {
    let dir = "custom_order.idx";
    // Reverse numeric ordering: "greater" means numerically smaller.
    let tree: Otley<i32, Citizen> = Otley::try_new_with(
        property(dir, 4, 4, true),
        |c: &Citizen| c.id,
        |a: &i32, b: &i32| a < b,
    )
    .await
    .expect("creates tree");

    for i in [2, 9, 5, 1, 7] {
        tree.insert(Citizen::new(i, 20, "u")).await.expect("insert worked");
    }

    // The leaf chain follows the supplied ordering, so "ascending" here is
    // numerically descending.
    assert_eq!(
        ids(&tree.between(&9, &5).await.expect("between worked")),
        vec![9, 7, 5]
    );
    assert_eq!(ids(&tree.above(&9).await.expect("above worked")), vec![9, 7, 5, 2, 1]);
    assert_eq!(ids(&tree.search(&7).await.expect("search worked")), vec![7]);
    cleanup(dir);
}

#[test_log::test(tokio::test)]
async fn it_conserves_count_through_random_removals() {
    let dir = "soak.idx";
    let tree = citizen_tree(dir, 8, 8, true).await;

    let mut keys: Vec<i32> = (1..=1000).collect();
    keys.shuffle(&mut rand::thread_rng());
    for i in &keys {
        tree.insert(Citizen::new(*i, 20, "u")).await.expect("insert worked");
    }
    assert_eq!(tree.count().await.expect("count worked"), 1000);

    keys.shuffle(&mut rand::thread_rng());
    let mut remaining = 1000;
    for i in &keys {
        tree.remove(i).await.expect("remove worked");
        remaining -= 1;
        let recovered = tree.between(&1, &1000).await.expect("between worked");
        assert_eq!(recovered.len(), remaining);
        tree.verify().await.expect("chain is ordered");
    }

    assert_eq!(tree.property.lock().await.root_kind, RootKind::Empty);
    cleanup(dir);
}
