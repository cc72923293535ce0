/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use rstest::rstest;
use taxonomy_tree::{MemoryGraph, TypeFilterPolicy};

use super::harness::{fixture, fixture_with, id, wait_until};

#[tokio::test(flavor = "multi_thread")]
async fn expanding_an_already_fetched_vertex_does_not_refetch() {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let before = f.controller.read(|tree| tree.children_of(animal).to_vec());

    f.controller.expand(animal);
    assert!(f.controller.expand_and_wait(animal).await);

    // Same arena keys: the subtree was never rebuilt.
    let after = f.controller.read(|tree| tree.children_of(animal).to_vec());
    assert_eq!(before, after);
}

#[rstest]
#[case::bird(2, &["Colugo", "penguin"])]
#[case::mammal(3, &["bat", "Colugo", "whale"])]
#[tokio::test(flavor = "multi_thread")]
async fn children_order_by_casefolded_text_and_survive_a_recycle(
    #[case] parent: u64,
    #[case] expected: &[&str],
) {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let parent = f.child(animal, id(parent));
    assert!(f.controller.expand_and_wait(parent).await);
    assert_eq!(f.child_texts(parent), expected);

    f.controller.collapse(parent);
    wait_until(|| f.child_ids(parent).is_empty()).await;
    assert!(f.controller.expand_and_wait(parent).await);
    assert_eq!(f.child_texts(parent), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn display_policy_filters_by_relationship_type() {
    // Colugo hangs off bird via #100 and off mammal via #200.
    let graph = MemoryGraph::new();
    graph.add_concept(id(1), "animal", true);
    graph.add_concept(id(2), "bird", true);
    graph.add_concept(id(3), "mammal", true);
    graph.add_concept(id(8), "Colugo", false);
    graph.link(id(1), id(2), [id(100)]);
    graph.link(id(1), id(3), [id(100)]);
    graph.link(id(2), id(8), [id(100)]);
    graph.link(id(3), id(8), [id(200)]);

    let mut f = fixture_with(
        Arc::new(graph),
        Arc::new(TypeFilterPolicy::new([id(100)])),
    )
    .await;

    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let bird = f.child(animal, id(2));
    let mammal = f.child(animal, id(3));
    assert!(f.controller.expand_and_wait(bird).await);
    assert!(f.controller.expand_and_wait(mammal).await);

    assert_eq!(f.child_ids(bird), vec![id(8)]);
    // Filtered, not an error.
    assert!(f.try_child(mammal, id(8)).is_none());
    assert!(f.alerts.try_recv().is_err());

    // A vertex whose children were all filtered out is still fetched:
    // waiting again completes immediately instead of refetching forever.
    assert!(f.controller.expand_and_wait(mammal).await);
    assert!(f.try_child(mammal, id(8)).is_none());
    f.controller.read(|tree| {
        let vertex = tree.vertex(mammal).expect("mammal exists");
        assert!(vertex.cached_child_edges().is_some());
        assert_eq!(vertex.fetch_generation(), 0);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_child_is_omitted_without_failing_the_fetch() {
    let mut f = fixture().await;
    f.graph.mark_unreadable(id(6), true);

    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let mammal = f.child(animal, id(3));
    assert!(f.controller.expand_and_wait(mammal).await);

    assert_eq!(f.child_ids(mammal), vec![id(8), id(7)]);
    assert!(f.alerts.try_recv().is_err());

    // Once readable again, a recycle brings the child back.
    f.graph.mark_unreadable(id(6), false);
    f.controller.collapse(mammal);
    wait_until(|| f.child_ids(mammal).is_empty()).await;
    assert!(f.controller.expand_and_wait(mammal).await);
    assert_eq!(f.child_ids(mammal), vec![id(6), id(8), id(7)]);
}
