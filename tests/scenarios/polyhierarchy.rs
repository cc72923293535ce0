/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use super::harness::{fixture, id, wait_until};

#[tokio::test(flavor = "multi_thread")]
async fn shared_node_materializes_once_per_parent_path() {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let bird = f.child(animal, id(2));
    let mammal = f.child(animal, id(3));
    assert!(f.controller.expand_and_wait(bird).await);
    assert!(f.controller.expand_and_wait(mammal).await);

    let under_bird = f.child(bird, id(8));
    let under_mammal = f.child(mammal, id(8));
    assert_ne!(under_bird, under_mammal, "occurrences must not share a vertex");

    f.controller.read(|tree| {
        for key in [under_bird, under_mammal] {
            let vertex = tree.vertex(key).expect("occurrence exists");
            assert!(vertex.is_multi_parent());
            // First occurrence along each path: still expandable.
            assert_eq!(vertex.multi_parent_depth(), 0);
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn collapsing_one_occurrence_leaves_the_other_alone() {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let bird = f.child(animal, id(2));
    let mammal = f.child(animal, id(3));
    assert!(f.controller.expand_and_wait(bird).await);
    assert!(f.controller.expand_and_wait(mammal).await);

    let under_bird = f.child(bird, id(8));
    let under_mammal = f.child(mammal, id(8));
    assert!(f.controller.expand_and_wait(under_bird).await);
    assert!(f.controller.expand_and_wait(under_mammal).await);
    assert_eq!(f.child_ids(under_mammal), vec![id(10)]);

    f.controller.collapse(under_bird);
    wait_until(|| f.child_ids(under_bird).is_empty()).await;

    assert!(f.is_expanded(under_mammal));
    assert_eq!(f.child_ids(under_mammal), vec![id(10)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_multi_parent_occurrences_become_leaves() {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let mammal = f.child(animal, id(3));
    assert!(f.controller.expand_and_wait(mammal).await);

    let colugo = f.child(mammal, id(8));
    let whale = f.child(mammal, id(7));
    assert!(f.controller.expand_and_wait(colugo).await);
    assert!(f.controller.expand_and_wait(whale).await);

    // relict is multi-parent itself; below colugo (also multi-parent) its
    // depth is 1 and it stops expanding, below whale it stays at depth 0.
    let nested = f.child(colugo, id(10));
    let plain = f.child(whale, id(10));
    let navigator = f.controller.current_navigator();
    f.controller.read(|tree| {
        let nested = tree.vertex(nested).expect("nested occurrence exists");
        assert_eq!(nested.multi_parent_depth(), 1);
        assert!(nested.is_leaf(&navigator));

        let plain = tree.vertex(plain).expect("plain occurrence exists");
        assert_eq!(plain.multi_parent_depth(), 0);
    });

    // Expanding a depth-limited occurrence completes without fetching.
    assert!(f.controller.expand_and_wait(nested).await);
    assert!(f.child_ids(nested).is_empty());
}
