// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn dig_points_stay_inside_the_rectangle() {
    let (width, height) = (5, 4);
    let points = dig_points(0, 0, width, height);
    assert!(!points.is_empty());
    for p in &points {
        assert!((0..width).contains(&p.x), "x out of bounds: {p:?}");
        assert!((0..height).contains(&p.z), "z out of bounds: {p:?}");
    }
}

#[test]
fn dig_points_apply_the_anchor_offset() {
    let points = dig_points(100, -50, 4, 4);
    for p in &points {
        assert!((100..104).contains(&p.x), "x out of bounds: {p:?}");
        assert!((-50..-46).contains(&p.z), "z out of bounds: {p:?}");
    }
}

#[test]
fn corners_and_edges_are_classified() {
    let points = dig_points(0, 0, 6, 5);

    let corner = points
        .iter()
        .find(|p| p.x == 0 && p.z == 0 && p.class == PointClass::Corner)
        .expect("bottom-left corner anchor");
    assert_eq!(corner.corner, CornerDir::BottomLeft);
    assert_eq!(corner.edge, EdgeDir::None);

    for p in &points {
        match p.class {
            PointClass::Corner => {
                assert_ne!(p.corner, CornerDir::None);
                assert_eq!(p.edge, EdgeDir::None);
            }
            PointClass::Edge => {
                assert_ne!(p.edge, EdgeDir::None);
                assert_eq!(p.corner, CornerDir::None);
            }
            PointClass::Moved => {
                // Snapped points remember which rim they came through.
                assert_ne!(p.edge, EdgeDir::None);
                assert_eq!(p.corner, CornerDir::None);
            }
            PointClass::Inside => {
                assert_eq!(p.edge, EdgeDir::None);
                assert_eq!(p.corner, CornerDir::None);
            }
        }
    }
}

#[test]
fn inside_points_sit_strictly_inside() {
    let (width, height) = (7, 7);
    for p in dig_points(0, 0, width, height) {
        if p.class == PointClass::Inside {
            assert!((1..width - 1).contains(&p.x), "inside point on x rim: {p:?}");
            assert!((1..height - 1).contains(&p.z), "inside point on z rim: {p:?}");
        }
    }
}

#[test]
fn single_column_rectangle_is_all_corners() {
    // A 1x1 area degenerates: the only real cell sits on every edge at once
    // and classifies as a corner.
    let points = dig_points(0, 0, 1, 1);
    assert!(points.iter().any(|p| p.class == PointClass::Corner && p.x == 0 && p.z == 0));
    for p in &points {
        assert_eq!((p.x, p.z), (0, 0));
    }
}
