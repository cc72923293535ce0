/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use taxonomy_tree::{Alert, Coordinate, GraphNodeId};

use super::harness::{fixture, id, wait_until};

#[tokio::test(flavor = "multi_thread")]
async fn refresh_restores_expansion_and_selection() {
    let f = fixture().await;
    assert!(f.controller.expand_and_select(&[id(1), id(3), id(7)]).await);

    f.controller.refresh().await;

    let animal = f.root_child(id(1));
    let mammal = f.child(animal, id(3));
    let bird = f.child(animal, id(2));
    assert!(f.is_expanded(animal));
    assert!(f.is_expanded(mammal));
    assert!(!f.is_expanded(bird), "bird was never expanded");
    assert!(f.child_ids(bird).is_empty());
    assert_eq!(f.selected_node(), Some(id(7)));
}

#[tokio::test(flavor = "multi_thread")]
async fn retired_nodes_are_pruned_silently() {
    let mut f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    let bird = f.child(animal, id(2));
    assert!(f.controller.expand_and_wait(bird).await);

    // Retiring publishes a change; the listener refreshes on its own. Wait
    // for the rebuilt tree, not just the clear that precedes it.
    f.graph.retire_concept(id(2), 0);
    wait_until(|| {
        f.controller.read(|tree| {
            let animal_refetched = tree
                .find_by_node_id(id(1))
                .and_then(|key| tree.vertex(key))
                .is_some_and(|vertex| !vertex.children().is_empty());
            animal_refetched && tree.find_by_node_id(id(2)).is_none()
        })
    })
    .await;

    let animal = f.root_child(id(1));
    assert!(f.is_expanded(animal));
    assert!(f.try_child(animal, id(2)).is_none());
    assert!(f.alerts.try_recv().is_err(), "pruning is not an alert");
}

#[tokio::test(flavor = "multi_thread")]
async fn description_changes_propagate_through_auto_refresh() {
    let f = fixture().await;
    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);

    f.graph.set_description(id(3), "beast");
    wait_until(|| {
        f.controller.read(|tree| {
            tree.find_by_node_id(id(3))
                .and_then(|key| tree.vertex(key))
                .is_some_and(|vertex| vertex.display_text() == "beast")
        })
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_coordinate_falls_back_to_the_unresolved_root() {
    let mut f = fixture().await;

    f.controller
        .set_coordinate(Coordinate::new("missing", 0))
        .await;

    match f.alerts.try_recv() {
        Ok(Alert::NavigatorUnavailable { coordinate, .. }) => {
            assert_eq!(coordinate.view, "missing");
        }
        other => panic!("expected a navigator alert, got {other:?}"),
    }
    let top = f
        .controller
        .read(|tree| tree.children_of(tree.root()).to_vec());
    assert_eq!(top.len(), 1);
    let unresolved = top[0];
    f.controller.read(|tree| {
        let vertex = tree.vertex(unresolved).expect("placeholder exists");
        assert_eq!(vertex.node_id(), GraphNodeId::UNRESOLVED);
    });
    assert!(f.controller.expand_and_wait(unresolved).await);
    assert!(f.child_ids(unresolved).is_empty());

    // Binding a valid coordinate again recovers the real taxonomy.
    f.controller.set_coordinate(Coordinate::default()).await;
    let top = f
        .controller
        .read(|tree| tree.children_of(tree.root()).len());
    assert_eq!(top, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn later_coordinate_reveals_newer_content() {
    let f = fixture().await;
    f.graph.add_concept_at(id(12), "axolotl", false, 3);
    f.graph.link_at(id(1), id(12), [id(100)], 3);

    let animal = f.root_child(id(1));
    assert!(f.controller.expand_and_wait(animal).await);
    assert!(!f.child_ids(animal).contains(&id(12)));

    f.controller
        .set_coordinate(Coordinate::new("default", 3))
        .await;

    // Expansion is restored against the new coordinate, newer child included.
    let animal = f.root_child(id(1));
    assert!(f.is_expanded(animal));
    assert!(f.child_ids(animal).contains(&id(12)));
}
