use approx::assert_relative_eq;
use deformable_physics::dynamics::{
    fem3d_cube::FemElement3DCube, fem3d_tetrahedron::FemElement3DTetrahedron,
    fem_element::{FemElement, FemMaterial},
    ode_state::OdeState,
};
use deformable_physics::*;

/// Corners of the axis-aligned box `[0, size]`, bottom face first, counter-clockwise.
fn box_corners(size: DVec3) -> [DVec3; 8] {
    [
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(size.x, 0.0, 0.0),
        DVec3::new(size.x, size.y, 0.0),
        DVec3::new(0.0, size.y, 0.0),
        DVec3::new(0.0, 0.0, size.z),
        DVec3::new(size.x, 0.0, size.z),
        DVec3::new(size.x, size.y, size.z),
        DVec3::new(0.0, size.y, size.z),
    ]
}

fn state_of(points: &[DVec3]) -> OdeState {
    let mut state = OdeState::with_num_dof(3, points.len()).expect("valid size");
    for (node, point) in points.iter().enumerate() {
        state.set_position(node, *point);
    }
    state
}

#[test]
fn valid_cube_has_positive_volume() {
    let corners = box_corners(DVec3::new(2.0, 1.0, 0.5));
    let mut cube = FemElement3DCube::new([0, 1, 2, 3, 4, 5, 6, 7], FemMaterial::default());
    let rest = state_of(&corners);
    cube.initialize(&rest).expect("valid cube");
    assert_relative_eq!(cube.rest_volume(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(cube.volume(&rest).expect("valid cube"), 1.0, epsilon = 1e-12);
}

#[test]
fn inverted_cube_is_degenerate() {
    let corners = box_corners(DVec3::ONE);
    let mut cube = FemElement3DCube::new([4, 5, 6, 7, 0, 1, 2, 3], FemMaterial::default());
    let error = cube
        .initialize(&state_of(&corners))
        .expect_err("top and bottom faces swapped");
    assert!(error.is_numerical());
    assert!(matches!(error, PhysicsError::DegenerateElement { .. }));
}

#[test]
fn squashed_cube_fails_its_volume_check() {
    let mut corners = box_corners(DVec3::ONE);
    let mut cube = FemElement3DCube::new([0, 1, 2, 3, 4, 5, 6, 7], FemMaterial::default());
    cube.initialize(&state_of(&corners)).expect("valid cube");

    for corner in &mut corners[4..] {
        corner.z = -0.5;
    }
    assert!(cube.volume(&state_of(&corners)).is_err());
}

#[test]
fn element_nodes_must_exist() {
    let mut tetrahedron = FemElement3DTetrahedron::new([0, 1, 2, 9], FemMaterial::default());
    let state = state_of(&[DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z]);
    assert!(matches!(
        tetrahedron.initialize(&state),
        Err(PhysicsError::NodeOutOfRange { node: 9, num_nodes: 4 })
    ));
}

#[test]
fn invalid_material_is_rejected_at_setup() {
    let mesh = Fem3DMeshData {
        nodes: vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z],
        tetrahedrons: vec![[0, 1, 2, 3]],
        ..Fem3DMeshData::default()
    };
    let parameters = Fem3DParameters {
        material: FemMaterial {
            poisson_ratio: 0.5,
            ..FemMaterial::default()
        },
        ..Fem3DParameters::default()
    };
    assert!(matches!(
        Fem3DRepresentation::new("jelly", &mesh, parameters),
        Err(PhysicsError::InvalidParameter(_))
    ));
}

#[test]
fn free_block_falls_without_deforming() {
    let mesh = Fem3DMeshData {
        nodes: box_corners(DVec3::splat(0.1)).to_vec(),
        cubes: vec![[0, 1, 2, 3, 4, 5, 6, 7]],
        ..Fem3DMeshData::default()
    };
    let parameters = Fem3DParameters {
        is_gravity_enabled: true,
        ..Fem3DParameters::default()
    };
    let mut block = Representation::from(
        Fem3DRepresentation::new("block", &mesh, parameters).expect("valid mesh"),
    );
    assert_eq!(block.num_dof(), 24);

    let dt = 1e-3;
    let gravity = DVec3::new(0.0, -9.81, 0.0);
    block.free_motion(dt, gravity).expect("stable step");

    let expected_drop = gravity.y * dt * dt;
    for (rest, now) in mesh.nodes.iter().zip(block.node_positions()) {
        assert_relative_eq!(now.y - rest.y, expected_drop, epsilon = 1e-9);
        assert_relative_eq!(now.x, rest.x, epsilon = 1e-12);
    }
    let compliance = block.compliance().expect("deformables expose their compliance");
    assert_eq!(compliance.nrows(), 24);
}
