// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::StatePatch;
use crate::test_support::{spawn_stub_agent, stub_store, StubWorld};
use serde_json::json;
use std::sync::Arc;

// -- pure helpers ---------------------------------------------------------

#[test]
fn chunk_origin_floors_toward_negative_infinity() {
    assert_eq!(chunk_origin(0, 0), (0, 0));
    assert_eq!(chunk_origin(15, 15), (0, 0));
    assert_eq!(chunk_origin(16, 31), (16, 16));
    assert_eq!(chunk_origin(-1, -16), (-16, -16));
    assert_eq!(chunk_origin(-17, 5), (-32, 0));
}

#[test]
fn bfs_finds_shortest_route_over_mined_cells() {
    let mined: HashSet<Vec3> =
        [(0, 0, 0), (1, 0, 0), (2, 0, 0), (2, 1, 0), (0, 1, 0)].into_iter().collect();
    let path = bfs_path(&mined, (0, 0, 0), (2, 1, 0)).expect("path");
    assert_eq!(path.first(), Some(&(0, 0, 0)));
    assert_eq!(path.last(), Some(&(2, 1, 0)));
    assert_eq!(path.len(), 4, "three hops through the tunnel");

    assert_eq!(bfs_path(&mined, (0, 0, 0), (0, 0, 0)), Some(vec![(0, 0, 0)]));
}

#[test]
fn bfs_reports_unreachable_goals() {
    let mined: HashSet<Vec3> = [(0, 0, 0), (5, 5, 5)].into_iter().collect();
    assert_eq!(bfs_path(&mined, (0, 0, 0), (5, 5, 5)), None);
    assert_eq!(bfs_path(&mined, (0, 0, 0), (9, 9, 9)), None);
}

// -- scripted-world subroutines ---------------------------------------------

async fn seeded_world(world: StubWorld) -> (Arc<crate::agent::Agent>, Arc<tokio::sync::Mutex<StubWorld>>) {
    let (store, _change_rx) = stub_store();
    store
        .update(
            7,
            StatePatch {
                coords: Some(crate::store::Coords::new(
                    world.pos.0,
                    world.pos.1,
                    world.pos.2,
                )),
                heading: Some(world.heading),
                fuel_level: Some(world.fuel),
                ..Default::default()
            },
        )
        .await
        .expect("seed");
    spawn_stub_agent(store, 7, world)
}

#[tokio::test]
async fn force_dig_forward_clears_a_blocking_block() {
    let mut world = StubWorld::new();
    world.blocks.insert((1, 0, 0), "minecraft:gravel".to_owned());
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    assert!(force_dig_forward(&sess).await.expect("force"));
    let world = world.lock().await;
    assert_eq!(world.pos, (1, 0, 0));
    assert_eq!(world.digs, 1);
}

#[tokio::test]
async fn dig_to_coordinate_reaches_the_target_in_axis_order() {
    let mut world = StubWorld::new();
    world.pos = (0, 70, 0);
    // A wall across the X leg and a ceiling block to clear on the way.
    world.blocks.insert((1, 70, 0), "minecraft:stone".to_owned());
    world.blocks.insert((2, 71, 0), "minecraft:stone".to_owned());
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    dig_to_coordinate(&sess, Coords::new(3, 72, 2)).await.expect("dig");

    let record = sess.record().await;
    assert_eq!(record.coords, Some(Coords::new(3, 72, 2)));
    let world = world.lock().await;
    assert_eq!(world.pos, (3, 72, 2));
    assert!(world.blocks.is_empty(), "obstacles on the route must be dug out");
}

#[tokio::test]
async fn mine_ore_vein_clears_an_l_shape_and_returns_home() {
    // L-shape: two ore cells ahead along +X, one more on top of the second.
    let mut world = StubWorld::new();
    world.blocks.insert((1, 0, 0), "minecraft:diamond_ore".to_owned());
    world.blocks.insert((2, 0, 0), "minecraft:diamond_ore".to_owned());
    world.blocks.insert((2, 1, 0), "minecraft:diamond_ore".to_owned());
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    mine_ore_vein(&sess, DEFAULT_VEIN_ACTIONS).await.expect("vein");

    let world = world.lock().await;
    assert_eq!(world.digs, 3, "each ore cell is dug exactly once");
    assert!(world.blocks.is_empty(), "the whole vein is gone");
    assert_eq!(world.pos, (0, 0, 0), "the miner returns to its origin");
    assert_eq!(world.heading, 0, "the miner restores its facing");
}

#[tokio::test]
async fn mine_ore_vein_ignores_non_ore_blocks() {
    let mut world = StubWorld::new();
    world.blocks.insert((1, 0, 0), "minecraft:stone".to_owned());
    world.blocks.insert((0, 1, 0), "minecraft:dirt".to_owned());
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    mine_ore_vein(&sess, DEFAULT_VEIN_ACTIONS).await.expect("vein");

    let world = world.lock().await;
    assert_eq!(world.digs, 0);
    assert_eq!(world.blocks.len(), 2);
    assert_eq!(world.pos, (0, 0, 0));
}

#[tokio::test]
async fn mine_ore_vein_respects_the_action_budget() {
    // A long seam of ore: the budget caps how far the miner gets.
    let mut world = StubWorld::new();
    for x in 1..=50 {
        world.blocks.insert((x, 0, 0), "minecraft:iron_ore".to_owned());
    }
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    mine_ore_vein(&sess, 10).await.expect("vein");

    let world = world.lock().await;
    assert!(world.digs < 50, "the budget must stop the miner early");
}

#[tokio::test]
async fn refuel_if_possible_burns_coal_until_headroom() {
    let mut world = StubWorld::new();
    world.fuel = 100;
    world.fuel_limit = 100_000;
    world.inventory[2] =
        json!({ "name": "minecraft:coal", "displayName": "Coal", "count": 64, "tags": {} });
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    refuel_if_possible(&sess).await.expect("refuel");

    let world = world.lock().await;
    assert_eq!(world.refuels, 1);
    assert_eq!(world.selected, 3, "the coal slot must be selected before refueling");
    assert_eq!(world.fuel, world.fuel_limit);
}

#[tokio::test]
async fn refuel_if_possible_stops_without_coal() {
    let mut world = StubWorld::new();
    world.fuel = 100;
    world.fuel_limit = 100_000;
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    refuel_if_possible(&sess).await.expect("refuel");
    assert_eq!(world.lock().await.refuels, 0);
}

#[tokio::test]
async fn count_empty_slots_reads_the_snapshot() {
    let mut world = StubWorld::new();
    world.inventory[0] = json!({ "name": "minecraft:chest", "count": 1, "tags": {} });
    world.inventory[5] = json!({ "name": "minecraft:cobblestone", "count": 64, "tags": {} });
    let (agent, _world) = seeded_world(world).await;
    let sess = agent.session().await;

    // Without a snapshot everything counts as empty.
    assert_eq!(count_empty_slots(&sess).await, 16);
    sess.get_inventory_details().await.expect("fetch");
    assert_eq!(count_empty_slots(&sess).await, 14);
}

#[tokio::test]
async fn dump_to_left_chest_restores_heading() {
    let mut world = StubWorld::new();
    world.inventory[0] = json!({ "name": "minecraft:chest", "count": 2, "tags": {} });
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    dump_to_left_chest(&sess, 1).await.expect("dump");

    let world = world.lock().await;
    assert_eq!(world.heading, 0, "facing must be restored after the dump");
    assert_eq!(world.pos, (0, 0, 0), "the column clear must end where it started");
}

#[tokio::test]
async fn dump_to_left_chest_bails_without_chests() {
    let (agent, world) = seeded_world(StubWorld::new()).await;
    let sess = agent.session().await;

    dump_to_left_chest(&sess, 1).await.expect("dump");
    assert_eq!(world.lock().await.heading, 0, "an empty chest slot leaves the pose alone");
}

#[tokio::test]
async fn face_heading_uses_shortest_rotation() {
    let (agent, world) = seeded_world(StubWorld::new()).await;
    let sess = agent.session().await;

    assert_eq!(face_heading(&sess, 0, 3).await.expect("face"), 3);
    assert_eq!(world.lock().await.heading, 3);

    assert_eq!(face_heading(&sess, 3, 1).await.expect("face"), 1);
    assert_eq!(world.lock().await.heading, 1);
}

#[tokio::test]
async fn run_named_rejects_unknown_subroutines() {
    let (agent, world) = seeded_world(StubWorld::new()).await;
    let sess = agent.session().await;

    run_named(&sess, "definitely_not_a_subroutine").await.expect("dispatch");
    run_named(&sess, "forward").await.expect("dispatch");
    assert_eq!(world.lock().await.pos, (1, 0, 0));
}

#[tokio::test]
async fn move_to_coordinate_crosses_a_simple_field() {
    let mut world = StubWorld::new();
    world.pos = (0, 148, 0);
    let (agent, world) = seeded_world(world).await;
    let sess = agent.session().await;

    move_to_coordinate(&sess, Coords::new(3, 149, 2)).await.expect("move");

    let world = world.lock().await;
    assert_eq!(world.pos, (3, 149, 2));
}

#[tokio::test]
async fn move_to_coordinate_side_steps_a_wall_it_cannot_dig() {
    // A one-block obstruction ahead; the walker climbs over it.
    let mut world = StubWorld::new();
    world.pos = (0, 150, 0);
    world.blocks.insert((1, 150, 0), "minecraft:obsidian".to_owned());
    let (agent, world) = seeded_world(world).await;
    {
        // The stub always digs successfully, so pre-dig behavior is covered
        // by dig_to_coordinate tests; here the route simply clears the block.
        let sess = agent.session().await;
        move_to_coordinate(&sess, Coords::new(2, 150, 0)).await.expect("move");
    }
    let world = world.lock().await;
    assert_eq!((world.pos.0, world.pos.2), (2, 0));
}
